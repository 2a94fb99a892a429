use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::rules::ConfigError;

/// 棋盘格子数量（3×3）。
pub const BOARD_CELLS: usize = 9;

/// 棋盘格子下标，按行优先排列：第 r 行第 c 列为 `r * 3 + c`。
pub type CellIndex = usize;

/// 全部 8 条获胜连线，顺序固定：三行、三列、两条对角线。
pub const WINNING_LINES: [[CellIndex; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Mark {
    #[default]
    X,
    O,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Mark::X => 'X',
            Mark::O => 'O',
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Mark {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Mark::X),
            "o" => Ok(Mark::O),
            _ => Err(ConfigError::UnknownMark {
                input: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    #[default]
    Human,
    Bot,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::Human => Seat::Bot,
            Seat::Bot => Seat::Human,
        }
    }
}

/// 双方的符号分配。机器人的符号总是人类符号的另一个。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlayerMarks {
    human: Mark,
}

impl PlayerMarks {
    pub fn new(human: Mark) -> Self {
        Self { human }
    }

    pub fn human(&self) -> Mark {
        self.human
    }

    pub fn bot(&self) -> Mark {
        self.human.other()
    }

    pub fn mark_of(&self, seat: Seat) -> Mark {
        match seat {
            Seat::Human => self.human(),
            Seat::Bot => self.bot(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GameStatus {
    InProgress,
    Won { winner: Mark, line: [CellIndex; 3] },
    Tie,
}

impl GameStatus {
    pub fn is_over(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }

    pub fn winner(&self) -> Option<Mark> {
        match self {
            GameStatus::Won { winner, .. } => Some(*winner),
            _ => None,
        }
    }

    /// 界面需要高亮的格子：胜利连线，平局时为整个棋盘。
    pub fn highlight_indices(&self) -> Vec<CellIndex> {
        match self {
            GameStatus::InProgress => Vec::new(),
            GameStatus::Won { line, .. } => line.to_vec(),
            GameStatus::Tie => (0..BOARD_CELLS).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    ImbalancedMarks { x: usize, o: usize },
    ConflictingWinners,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Option<Mark>; BOARD_CELLS],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [Option<Mark>; BOARD_CELLS]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Option<Mark>; BOARD_CELLS] {
        &self.cells
    }

    pub fn get(&self, index: CellIndex) -> Option<Mark> {
        self.cells[index]
    }

    /// 无条件写入；占用检查由调用方负责。
    pub fn set(&mut self, index: CellIndex, mark: Mark) {
        self.cells[index] = Some(mark);
    }

    pub fn clear(&mut self, index: CellIndex) {
        self.cells[index] = None;
    }

    pub fn reset(&mut self) {
        self.cells = [None; BOARD_CELLS];
    }

    pub fn is_empty(&self, index: CellIndex) -> bool {
        self.cells[index].is_none()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn empty_indices(&self) -> Vec<CellIndex> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_none())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn count(&self, mark: Mark) -> usize {
        self.cells.iter().filter(|cell| **cell == Some(mark)).count()
    }

    fn line_owner(&self, line: &[CellIndex; 3]) -> Option<Mark> {
        let first = self.cells[line[0]]?;
        if self.cells[line[1]] == Some(first) && self.cells[line[2]] == Some(first) {
            Some(first)
        } else {
            None
        }
    }

    /// 按固定顺序扫描连线，返回第一条满足条件的连线。
    pub fn evaluate(&self) -> GameStatus {
        for line in &WINNING_LINES {
            if let Some(winner) = self.line_owner(line) {
                return GameStatus::Won {
                    winner,
                    line: *line,
                };
            }
        }

        if self.is_full() {
            GameStatus::Tie
        } else {
            GameStatus::InProgress
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let x = self.count(Mark::X);
        let o = self.count(Mark::O);
        if x.abs_diff(o) > 1 {
            return Err(IntegrityError::ImbalancedMarks { x, o });
        }

        let x_wins = WINNING_LINES
            .iter()
            .any(|line| self.line_owner(line) == Some(Mark::X));
        let o_wins = WINNING_LINES
            .iter()
            .any(|line| self.line_owner(line) == Some(Mark::O));
        if x_wins && o_wins {
            return Err(IntegrityError::ConflictingWinners);
        }

        Ok(())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            for (col, cell) in chunk.iter().enumerate() {
                if col > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", cell.map_or('.', Mark::symbol))?;
            }
        }
        Ok(())
    }
}
