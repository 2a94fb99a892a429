//! 对局核心逻辑模块（棋盘、轮次与校验）。

pub mod rules;
pub mod state;

pub use rules::{
    ConfigError,
    GameConfig,
    GameController,
    GameEvent,
    GameSnapshot,
    MoveError,
    MoveResolution,
    PendingBotMove,
    DEFAULT_BOT_DELAY_MS,
};
pub use state::{
    Board,
    CellIndex,
    GameStatus,
    IntegrityError,
    Mark,
    PlayerMarks,
    Seat,
    BOARD_CELLS,
    WINNING_LINES,
};
