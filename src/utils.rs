/// 输出到浏览器控制台；非 wasm 目标（如本地单元测试）下不输出。
pub fn log(message: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        web_sys::console::log_1(&message.into());
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
    }
}

pub fn set_panic_hook() {
    // 发生 panic 时把信息打印到控制台，便于调试。
    #[cfg(feature = "console_error_panic_hook")]
    {
        console_error_panic_hook::set_once();
    }
}
