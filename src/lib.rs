pub mod ai;
pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{best_move, minimax, BotAgent, BotChoice, BotDecision, Difficulty, ScoredMove};
pub use game::{
    Board, CellIndex, ConfigError, GameConfig, GameController, GameEvent, GameSnapshot,
    GameStatus, IntegrityError, Mark, MoveError, MoveResolution, PendingBotMove, PlayerMarks,
    Seat,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error<E: Serialize>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// 非法落子不抛异常，而是以 `rejected` 字段返回，棋盘保持原样。
#[derive(Serialize)]
struct MoveResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<MoveResolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<MoveError>,
    status: GameStatus,
}

impl MoveResponse {
    fn from_result(result: Result<MoveResolution, MoveError>, status: GameStatus) -> Self {
        match result {
            Ok(resolution) => Self {
                status: resolution.status,
                applied: Some(resolution),
                rejected: None,
            },
            Err(error) => {
                utils::log(&format!("move ignored: {error:?}"));
                Self {
                    applied: None,
                    rejected: Some(error),
                    status,
                }
            }
        }
    }
}

fn respond(
    controller: &mut GameController,
    action: impl FnOnce(&mut GameController) -> Result<MoveResolution, MoveError>,
) -> Result<String, JsValue> {
    let result = action(controller);
    let response = MoveResponse::from_result(result, controller.status());
    serde_json::to_string(&response).map_err(serde_to_js_error)
}

fn snapshot_json(snapshot: &GameSnapshot) -> Result<String, JsValue> {
    serde_json::to_string(snapshot).map_err(serde_to_js_error)
}

#[wasm_bindgen]
pub struct GameEngine {
    controller: Rc<RefCell<GameController>>,
    bot_delay_ms: u32,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(to_js_error)?,
            None => GameConfig::default(),
        };
        Ok(GameEngine {
            controller: Rc::new(RefCell::new(GameController::new(&config))),
            bot_delay_ms: config.bot_delay_ms,
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        snapshot_json(&self.controller.borrow().snapshot())
    }

    pub fn apply_human_move(&mut self, index: usize) -> Result<String, JsValue> {
        let mut controller = self.controller.borrow_mut();
        respond(&mut controller, |controller| controller.apply_human_move(index))
    }

    /// 立即执行机器人回合（不经过延迟）。
    pub fn request_bot_move(&mut self) -> Result<String, JsValue> {
        let mut controller = self.controller.borrow_mut();
        respond(&mut controller, |controller| {
            let ticket = controller.bot_move_ticket()?;
            controller.request_bot_move(ticket)
        })
    }

    /// 延迟后执行机器人回合。未轮到机器人时立即以拒绝结果完成；
    /// 延迟期间若发生落子、重置或重新配置，结果为 `StaleBotMove`。
    pub fn play_bot_move_after(&self, delay_ms: Option<u32>) -> Promise {
        let controller = Rc::clone(&self.controller);
        let delay = delay_ms.unwrap_or(self.bot_delay_ms);
        let ticket = controller.borrow().bot_move_ticket();
        let ticket = match ticket {
            Ok(ticket) => ticket,
            Err(error) => {
                let mut controller = controller.borrow_mut();
                let json = respond(&mut controller, |_| Err(error));
                return match json {
                    Ok(json) => Promise::resolve(&JsValue::from_str(&json)),
                    Err(error) => Promise::reject(&error),
                };
            }
        };

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut controller = controller.borrow_mut();
            let json = respond(&mut controller, |controller| {
                controller.request_bot_move(ticket)
            })?;
            Ok(JsValue::from_str(&json))
        })
    }

    pub fn configure_difficulty(&mut self, value: u32) -> Result<String, JsValue> {
        let difficulty = Difficulty::try_from(value).map_err(to_js_error)?;
        snapshot_json(&self.controller.borrow_mut().configure_difficulty(difficulty))
    }

    /// 接受数字或预设名（easy / normal / hard / expert）。
    pub fn configure_difficulty_str(&mut self, value: &str) -> Result<String, JsValue> {
        let difficulty: Difficulty = value.parse().map_err(to_js_error)?;
        snapshot_json(&self.controller.borrow_mut().configure_difficulty(difficulty))
    }

    pub fn configure_marks(&mut self, human_mark: &str) -> Result<String, JsValue> {
        let mark: Mark = human_mark.parse().map_err(to_js_error)?;
        snapshot_json(&self.controller.borrow_mut().configure_marks(mark))
    }

    pub fn reset_game(&mut self) -> Result<String, JsValue> {
        snapshot_json(&self.controller.borrow_mut().reset_game())
    }

    pub fn bot_delay_ms(&self) -> u32 {
        self.bot_delay_ms
    }
}

/// 对任意棋盘求值。
#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&board.evaluate()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "emptyIndices")]
pub fn empty_indices(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_value(&board.empty_indices()).map_err(JsValue::from)
}

/// 不依赖对局状态，为给定棋盘计算机器人的一步。棋盘先做一致性检查。
#[wasm_bindgen(js_name = "computeBotMove")]
pub fn compute_bot_move(
    board: JsValue,
    bot_mark: &str,
    difficulty: u32,
) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    board.integrity_check().map_err(to_js_error)?;
    let bot: Mark = bot_mark.parse().map_err(to_js_error)?;
    let difficulty = Difficulty::try_from(difficulty).map_err(to_js_error)?;

    let mut agent = BotAgent::new(difficulty);
    let decision = agent.choose_move(&board, bot);
    to_value(&decision).map_err(JsValue::from)
}
