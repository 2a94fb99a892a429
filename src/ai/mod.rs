//! 机器人算法模块（极小化极大搜索与难度混合）。

pub mod minimax;

pub use minimax::{
    best_move, minimax, BotAgent, BotChoice, BotDecision, Difficulty, ScoredMove, MAX_DIFFICULTY,
    WIN_SCORE,
};
