use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::{Board, CellIndex, ConfigError, GameStatus, Mark};

/// 终局得分基数，按深度扣减：越快获胜得分越高，越晚失败损失越小。
pub const WIN_SCORE: i32 = 20;

pub const MAX_DIFFICULTY: u8 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const EASY: Difficulty = Difficulty(0);
    pub const NORMAL: Difficulty = Difficulty(50);
    pub const HARD: Difficulty = Difficulty(85);
    pub const EXPERT: Difficulty = Difficulty(MAX_DIFFICULTY);

    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if value > MAX_DIFFICULTY {
            return Err(ConfigError::DifficultyOutOfRange {
                value: u32::from(value),
            });
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Difficulty::new(value)
    }
}

/// JS 数字先经过检查再收窄，超出范围的值不会回绕。
impl TryFrom<u32> for Difficulty {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let narrowed =
            u8::try_from(value).map_err(|_| ConfigError::DifficultyOutOfRange { value })?;
        Difficulty::new(narrowed)
    }
}

impl From<Difficulty> for u8 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::EASY),
            "normal" | "medium" => Ok(Difficulty::NORMAL),
            "hard" => Ok(Difficulty::HARD),
            "expert" | "impossible" => Ok(Difficulty::EXPERT),
            _ => {
                let value: u32 = trimmed.parse().map_err(|_| ConfigError::InvalidDifficulty {
                    input: trimmed.to_string(),
                })?;
                Difficulty::try_from(value)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredMove {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<CellIndex>,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotChoice {
    Optimal,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotDecision {
    pub index: CellIndex,
    pub choice: BotChoice,
    pub roll: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    pub nodes: u64,
}

struct SearchStats {
    nodes: u64,
}

impl SearchStats {
    fn new() -> Self {
        Self { nodes: 0 }
    }
}

/// 穷举极小化极大搜索。`bot` 方为极大方，另一方为极小方。
///
/// 每个假设落子在下一个兄弟分支之前都会被撤销，返回时 `board` 与调用前一致。
pub fn minimax(board: &mut Board, to_move: Mark, bot: Mark, depth: u8) -> ScoredMove {
    let mut stats = SearchStats::new();
    minimax_rec(board, to_move, bot, depth, &mut stats)
}

fn terminal_score(status: GameStatus, bot: Mark, depth: u8) -> Option<i32> {
    let depth = i32::from(depth);
    match status {
        GameStatus::Won { winner, .. } if winner == bot => Some(WIN_SCORE - depth),
        GameStatus::Won { .. } => Some(depth - WIN_SCORE),
        GameStatus::Tie => Some(0),
        GameStatus::InProgress => None,
    }
}

fn minimax_rec(
    board: &mut Board,
    to_move: Mark,
    bot: Mark,
    depth: u8,
    stats: &mut SearchStats,
) -> ScoredMove {
    stats.nodes += 1;

    if let Some(score) = terminal_score(board.evaluate(), bot, depth) {
        return ScoredMove { index: None, score };
    }

    let maximizing = to_move == bot;
    let mut best: Option<ScoredMove> = None;

    for index in board.empty_indices() {
        board.set(index, to_move);
        let reply = minimax_rec(board, to_move.other(), bot, depth + 1, stats);
        board.clear(index);

        let candidate = ScoredMove {
            index: Some(index),
            score: reply.score,
        };
        best = match best {
            None => Some(candidate),
            Some(current) if maximizing && candidate.score > current.score => Some(candidate),
            Some(current) if !maximizing && candidate.score < current.score => Some(candidate),
            keep => keep,
        };
    }

    // 非终局棋盘必有空格。
    best.unwrap_or(ScoredMove {
        index: None,
        score: 0,
    })
}

/// 在棋盘副本上为 `bot` 搜索最优着法；终局时返回 `None`。
pub fn best_move(board: &Board, bot: Mark) -> Option<ScoredMove> {
    search_best(board, bot).0
}

fn search_best(board: &Board, bot: Mark) -> (Option<ScoredMove>, u64) {
    if board.evaluate().is_over() {
        return (None, 0);
    }
    let mut snapshot = board.clone();
    let mut stats = SearchStats::new();
    let scored = minimax_rec(&mut snapshot, bot, bot, 0, &mut stats);
    (scored.index.map(|_| scored), stats.nodes)
}

pub struct BotAgent {
    difficulty: Difficulty,
    rng: SmallRng,
}

impl BotAgent {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(difficulty: Difficulty, seed: u64) -> Self {
        Self {
            difficulty,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    /// 掷出 [0, 100] 的整数 R：难度 < R 时随机落子，否则走极小化极大的推荐。
    pub fn choose_move(&mut self, board: &Board, bot: Mark) -> Option<BotDecision> {
        let empties = board.empty_indices();
        if empties.is_empty() {
            return None;
        }

        let roll: u8 = self.rng.gen_range(0..=MAX_DIFFICULTY);
        if self.difficulty.value() < roll {
            let index = *empties.choose(&mut self.rng)?;
            return Some(BotDecision {
                index,
                choice: BotChoice::Random,
                roll,
                score: None,
                nodes: 0,
            });
        }

        let (scored, nodes) = search_best(board, bot);
        let scored = scored?;
        Some(BotDecision {
            index: scored.index?,
            choice: BotChoice::Optimal,
            roll,
            score: Some(scored.score),
            nodes,
        })
    }
}
