use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{Board, CellIndex, GameStatus, Mark, PlayerMarks, Seat, BOARD_CELLS};
use crate::ai::{BotAgent, BotDecision, Difficulty};
use crate::utils::log;

/// 人类落子后机器人回应前的默认延迟。
pub const DEFAULT_BOT_DELAY_MS: u32 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum MoveError {
    IndexOutOfRange { index: CellIndex },
    CellOccupied { index: CellIndex },
    NotPlayerTurn { expected: Seat },
    GameFinished,
    StaleBotMove {
        scheduled: PendingBotMove,
        current: PendingBotMove,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ConfigError {
    DifficultyOutOfRange { value: u32 },
    InvalidDifficulty { input: String },
    UnknownMark { input: String },
    InvalidJson { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DifficultyOutOfRange { value } => {
                write!(f, "difficulty {value} is outside 0..=100")
            }
            ConfigError::InvalidDifficulty { input } => write!(f, "invalid difficulty `{input}`"),
            ConfigError::UnknownMark { input } => write!(f, "unknown mark `{input}`"),
            ConfigError::InvalidJson { message } => write!(f, "invalid config: {message}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub human_mark: Mark,
    pub difficulty: Difficulty,
    pub bot_delay_ms: u32,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|error| ConfigError::InvalidJson {
            message: error.to_string(),
        })
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            human_mark: Mark::X,
            difficulty: Difficulty::EASY,
            bot_delay_ms: DEFAULT_BOT_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MarkPlaced {
        seat: Seat,
        mark: Mark,
        index: CellIndex,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decision: Option<BotDecision>,
    },
    TurnPassed {
        to: Seat,
    },
    GameOver {
        status: GameStatus,
    },
}

/// 延迟执行的机器人落子凭证，记录安排时的对局代数与已落子数。
/// 重置、重新配置或任何一步新的落子都会使其失效。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingBotMove {
    pub epoch: u64,
    pub ply: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveResolution {
    pub board: Board,
    pub status: GameStatus,
    pub changed: Vec<CellIndex>,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_bot_move: Option<PendingBotMove>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSnapshot {
    pub board: Board,
    pub status: GameStatus,
    pub turn: Seat,
    pub human_mark: Mark,
    pub bot_mark: Mark,
    pub difficulty: Difficulty,
    pub highlight: Vec<CellIndex>,
}

/// 持有唯一的权威棋盘，负责轮次、校验与机器人回合。
pub struct GameController {
    board: Board,
    marks: PlayerMarks,
    agent: BotAgent,
    turn: Seat,
    status: GameStatus,
    epoch: u64,
}

impl GameController {
    pub fn new(config: &GameConfig) -> Self {
        Self::with_agent(config.human_mark, BotAgent::new(config.difficulty))
    }

    pub fn with_seed(config: &GameConfig, seed: u64) -> Self {
        Self::with_agent(config.human_mark, BotAgent::with_seed(config.difficulty, seed))
    }

    fn with_agent(human_mark: Mark, agent: BotAgent) -> Self {
        Self {
            board: Board::new(),
            marks: PlayerMarks::new(human_mark),
            agent,
            turn: Seat::Human,
            status: GameStatus::InProgress,
            epoch: 0,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn turn(&self) -> Seat {
        self.turn
    }

    pub fn marks(&self) -> PlayerMarks {
        self.marks
    }

    pub fn difficulty(&self) -> Difficulty {
        self.agent.difficulty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 本局已落子数。
    pub fn ply(&self) -> usize {
        BOARD_CELLS - self.board.empty_indices().len()
    }

    pub fn is_over(&self) -> bool {
        self.status.is_over()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board.clone(),
            status: self.status,
            turn: self.turn,
            human_mark: self.marks.human(),
            bot_mark: self.marks.bot(),
            difficulty: self.difficulty(),
            highlight: self.status.highlight_indices(),
        }
    }

    fn current_ticket(&self) -> PendingBotMove {
        PendingBotMove {
            epoch: self.epoch,
            ply: self.ply(),
        }
    }

    /// 轮到机器人时返回凭证，否则返回机器人不能落子的原因。
    pub fn bot_move_ticket(&self) -> Result<PendingBotMove, MoveError> {
        self.ensure_in_progress()?;
        self.ensure_turn_owner(Seat::Bot)?;
        Ok(self.current_ticket())
    }

    pub fn pending_bot_move(&self) -> Option<PendingBotMove> {
        self.bot_move_ticket().ok()
    }

    fn ensure_in_progress(&self) -> Result<(), MoveError> {
        if self.is_over() {
            return Err(MoveError::GameFinished);
        }
        Ok(())
    }

    fn ensure_turn_owner(&self, seat: Seat) -> Result<(), MoveError> {
        if self.turn != seat {
            return Err(MoveError::NotPlayerTurn { expected: self.turn });
        }
        Ok(())
    }

    fn ensure_playable(&self, index: CellIndex) -> Result<(), MoveError> {
        if index >= BOARD_CELLS {
            return Err(MoveError::IndexOutOfRange { index });
        }
        if !self.board.is_empty(index) {
            return Err(MoveError::CellOccupied { index });
        }
        Ok(())
    }

    fn place(
        &mut self,
        seat: Seat,
        index: CellIndex,
        decision: Option<BotDecision>,
    ) -> MoveResolution {
        let mark = self.marks.mark_of(seat);
        self.board.set(index, mark);
        self.status = self.board.evaluate();

        let mut events = vec![GameEvent::MarkPlaced {
            seat,
            mark,
            index,
            decision,
        }];

        if self.status.is_over() {
            log(&format!("game over: {:?}", self.status));
            events.push(GameEvent::GameOver {
                status: self.status,
            });
        } else {
            self.turn = seat.other();
            events.push(GameEvent::TurnPassed { to: self.turn });
        }

        MoveResolution {
            board: self.board.clone(),
            status: self.status,
            changed: vec![index],
            events,
            pending_bot_move: self.pending_bot_move(),
        }
    }

    /// 校验并落下人类的一步；非法请求不修改任何状态。
    pub fn apply_human_move(&mut self, index: CellIndex) -> Result<MoveResolution, MoveError> {
        self.ensure_in_progress()?;
        self.ensure_turn_owner(Seat::Human)?;
        self.ensure_playable(index)?;

        Ok(self.place(Seat::Human, index, None))
    }

    /// 延迟回调触发时执行。凭证与当前局面不符时不做任何事。
    pub fn request_bot_move(
        &mut self,
        ticket: PendingBotMove,
    ) -> Result<MoveResolution, MoveError> {
        let current = self.current_ticket();
        if ticket != current {
            return Err(MoveError::StaleBotMove {
                scheduled: ticket,
                current,
            });
        }
        self.ensure_in_progress()?;
        self.ensure_turn_owner(Seat::Bot)?;

        let decision = self
            .agent
            .choose_move(&self.board, self.marks.bot())
            .ok_or(MoveError::GameFinished)?;
        self.ensure_playable(decision.index)?;

        log(&format!(
            "bot plays {} ({:?}, roll {})",
            decision.index, decision.choice, decision.roll
        ));
        let index = decision.index;
        Ok(self.place(Seat::Bot, index, Some(decision)))
    }

    fn restart(&mut self) {
        self.board.reset();
        self.turn = Seat::Human;
        self.status = GameStatus::InProgress;
        self.epoch += 1;
    }

    pub fn reset_game(&mut self) -> GameSnapshot {
        self.restart();
        self.snapshot()
    }

    pub fn configure_difficulty(&mut self, difficulty: Difficulty) -> GameSnapshot {
        self.restart();
        self.agent.set_difficulty(difficulty);
        log(&format!("difficulty set to {}", difficulty.value()));
        self.snapshot()
    }

    pub fn configure_marks(&mut self, human: Mark) -> GameSnapshot {
        self.restart();
        self.marks = PlayerMarks::new(human);
        self.snapshot()
    }
}

impl Default for GameController {
    fn default() -> Self {
        Self::new(&GameConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{best_move, BotChoice};

    fn expert_controller(human: Mark) -> GameController {
        let config = GameConfig {
            human_mark: human,
            difficulty: Difficulty::EXPERT,
            ..GameConfig::default()
        };
        GameController::with_seed(&config, 11)
    }

    #[test]
    fn human_move_hands_turn_to_bot() {
        let mut controller = expert_controller(Mark::X);
        let resolution = controller.apply_human_move(0).expect("legal move");

        assert_eq!(resolution.changed, vec![0]);
        assert_eq!(resolution.board.get(0), Some(Mark::X));
        assert_eq!(resolution.status, GameStatus::InProgress);
        assert_eq!(
            resolution.pending_bot_move,
            Some(PendingBotMove { epoch: 0, ply: 1 })
        );
        assert_eq!(
            resolution.events.last(),
            Some(&GameEvent::TurnPassed { to: Seat::Bot })
        );
        assert_eq!(controller.turn(), Seat::Bot);
    }

    #[test]
    fn invalid_human_moves_do_not_mutate() {
        let mut controller = expert_controller(Mark::X);
        assert_eq!(
            controller.apply_human_move(9),
            Err(MoveError::IndexOutOfRange { index: 9 })
        );

        controller.apply_human_move(4).expect("legal move");
        let before = controller.board().clone();

        assert_eq!(
            controller.apply_human_move(0),
            Err(MoveError::NotPlayerTurn {
                expected: Seat::Bot
            })
        );
        assert_eq!(controller.board(), &before);

        let ticket = controller.pending_bot_move().expect("bot is due");
        let bot_reply = controller.request_bot_move(ticket).expect("bot moves");
        let taken = bot_reply.changed[0];

        assert_eq!(
            controller.apply_human_move(taken),
            Err(MoveError::CellOccupied { index: taken })
        );
        assert_eq!(controller.board(), &bot_reply.board);
    }

    #[test]
    fn bot_reply_matches_search_at_full_difficulty() {
        let mut controller = expert_controller(Mark::X);
        controller.apply_human_move(0).expect("legal move");
        let ticket = controller.pending_bot_move().expect("bot is due");

        let resolution = controller.request_bot_move(ticket).expect("bot moves");
        assert_eq!(resolution.changed, vec![4]);
        assert_eq!(resolution.board.get(4), Some(Mark::O));
        assert!(resolution.pending_bot_move.is_none());
        assert_eq!(controller.turn(), Seat::Human);

        match &resolution.events[0] {
            GameEvent::MarkPlaced {
                seat: Seat::Bot,
                mark: Mark::O,
                index: 4,
                decision: Some(decision),
            } => assert_eq!(decision.choice, BotChoice::Optimal),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reset_invalidates_pending_bot_move() {
        let mut controller = expert_controller(Mark::X);
        controller.apply_human_move(0).expect("legal move");
        let ticket = controller.pending_bot_move().expect("bot is due");

        let snapshot = controller.reset_game();
        assert_eq!(snapshot.board, Board::new());
        assert_eq!(snapshot.turn, Seat::Human);

        assert_eq!(
            controller.request_bot_move(ticket),
            Err(MoveError::StaleBotMove {
                scheduled: PendingBotMove { epoch: 0, ply: 1 },
                current: PendingBotMove { epoch: 1, ply: 0 },
            })
        );
        assert_eq!(controller.board(), &Board::new());

        // 重置后人类先手，新对局中旧凭证仍然无效。
        controller.apply_human_move(8).expect("legal move");
        assert!(controller.request_bot_move(ticket).is_err());
        assert!(controller.pending_bot_move().is_some());
    }

    #[test]
    fn ticket_from_an_earlier_bot_turn_is_stale() {
        let mut controller = expert_controller(Mark::X);
        controller.apply_human_move(0).expect("legal move");
        let first_turn = controller.pending_bot_move().expect("bot is due");
        controller.request_bot_move(first_turn).expect("bot moves");

        controller.apply_human_move(8).expect("legal move");
        let before = controller.board().clone();
        assert_eq!(
            controller.request_bot_move(first_turn),
            Err(MoveError::StaleBotMove {
                scheduled: first_turn,
                current: PendingBotMove { epoch: 0, ply: 3 },
            })
        );
        assert_eq!(controller.board(), &before);

        let second_turn = controller.pending_bot_move().expect("bot is due");
        assert_eq!(second_turn.ply, 3);
        assert!(controller.request_bot_move(second_turn).is_ok());
    }

    #[test]
    fn ticket_taken_before_the_bot_was_due_cannot_fire() {
        let mut controller = expert_controller(Mark::X);
        assert_eq!(
            controller.bot_move_ticket(),
            Err(MoveError::NotPlayerTurn {
                expected: Seat::Human
            })
        );

        // 人类尚未落子时构造的凭证，在人类落子后不能替机器人落子。
        let early = PendingBotMove {
            epoch: controller.epoch(),
            ply: controller.ply(),
        };
        controller.apply_human_move(0).expect("legal move");
        let before = controller.board().clone();
        assert!(matches!(
            controller.request_bot_move(early),
            Err(MoveError::StaleBotMove { .. })
        ));
        assert_eq!(controller.board(), &before);
        assert_eq!(controller.turn(), Seat::Bot);
    }

    #[test]
    fn reconfiguring_resets_board_and_turn() {
        let mut controller = expert_controller(Mark::X);
        controller.apply_human_move(2).expect("legal move");

        let snapshot = controller.configure_marks(Mark::O);
        assert_eq!(snapshot.human_mark, Mark::O);
        assert_eq!(snapshot.bot_mark, Mark::X);
        assert_eq!(snapshot.board, Board::new());
        assert_eq!(snapshot.turn, Seat::Human);

        let resolution = controller.apply_human_move(2).expect("human opens");
        assert_eq!(resolution.board.get(2), Some(Mark::O));

        let snapshot = controller.configure_difficulty(Difficulty::NORMAL);
        assert_eq!(snapshot.difficulty, Difficulty::NORMAL);
        assert_eq!(snapshot.board, Board::new());
        assert_eq!(controller.epoch(), 2);
    }

    #[test]
    fn bot_without_a_turn_is_rejected() {
        let mut controller = expert_controller(Mark::X);
        let ticket = PendingBotMove {
            epoch: controller.epoch(),
            ply: controller.ply(),
        };
        assert_eq!(
            controller.request_bot_move(ticket),
            Err(MoveError::NotPlayerTurn {
                expected: Seat::Human
            })
        );
        assert!(controller.board().empty_indices().len() == BOARD_CELLS);
    }

    #[test]
    fn expert_bot_never_loses_a_full_game() {
        // 人类按自身视角的最优策略对弈，专家机器人至少打平。
        for human in [Mark::X, Mark::O] {
            let mut controller = expert_controller(human);
            loop {
                let index = best_move(controller.board(), human)
                    .and_then(|scored| scored.index)
                    .expect("human has a move");
                let resolution = controller.apply_human_move(index).expect("legal move");
                let Some(ticket) = resolution.pending_bot_move else {
                    break;
                };
                let resolution = controller.request_bot_move(ticket).expect("bot moves");
                if resolution.status.is_over() {
                    break;
                }
            }
            assert_ne!(controller.status().winner(), Some(human));
        }
    }

    #[test]
    fn finished_game_rejects_further_moves() {
        let mut controller = expert_controller(Mark::X);
        // 人类随意落子，机器人最终获胜或平局。
        loop {
            let Some(&index) = controller.board().empty_indices().first() else {
                break;
            };
            let resolution = controller.apply_human_move(index).expect("legal move");
            match resolution.pending_bot_move {
                Some(ticket) => {
                    let reply = controller.request_bot_move(ticket).expect("bot moves");
                    if reply.status.is_over() {
                        break;
                    }
                }
                None => break,
            }
        }

        assert!(controller.is_over());
        let before = controller.board().clone();
        assert_eq!(controller.apply_human_move(0), Err(MoveError::GameFinished));
        assert_eq!(controller.board(), &before);
    }

    #[test]
    fn config_json_uses_defaults() {
        let config = GameConfig::from_json(r#"{"difficulty": 70}"#).expect("valid config");
        assert_eq!(config.human_mark, Mark::X);
        assert_eq!(config.difficulty.value(), 70);
        assert_eq!(config.bot_delay_ms, DEFAULT_BOT_DELAY_MS);

        assert!(matches!(
            GameConfig::from_json(r#"{"difficulty": 300}"#),
            Err(ConfigError::InvalidJson { .. })
        ));
        assert!(matches!(
            "q".parse::<Mark>(),
            Err(ConfigError::UnknownMark { .. })
        ));
    }
}
