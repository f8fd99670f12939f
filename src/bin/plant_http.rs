#![no_std]
#![no_main]

use embassy_executor::Spawner;
use esp_backtrace as _;

use plantview::{
    aio::http::HttpSession,
    board,
    config::{AIO_HOST, AIO_HTTPS_PORT, Config, Settings},
    hardware::EmbassyTime,
    logic::AppLogic,
    link_buffers,
    model::POLLING_FEEDS,
    net::TlsConnector,
    runner::Runner,
};

esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_println::println!("=== Plantview (HTTP) ===");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => panic!("[ERROR] {}", e),
    };
    let settings = Settings::new();

    let board = match board::bring_up(&spawner, peripherals, &config) {
        Ok(board) => board,
        Err(e) => panic!("[ERROR] Bring-up failed: {}", e),
    };

    let web = TlsConnector::new(board.stack, link_buffers!());
    let mut service = HttpSession::new(
        web,
        AIO_HOST,
        AIO_HTTPS_PORT,
        config.aio_username,
        config.aio_key,
    );

    let mut app = AppLogic::new(POLLING_FEEDS, &settings);
    let mut runner = Runner::new(board.radio, board.light, board.panel, EmbassyTime, settings);

    let Err(e) = runner.run_polling(&mut app, &mut service).await;
    panic!("[ERROR] {}", e);
}
