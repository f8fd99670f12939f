#![no_std]
#![no_main]

use embassy_executor::Spawner;
use esp_backtrace as _;

use plantview::{
    aio::{http::HttpSession, mqtt::MqttOptions},
    board,
    config::{AIO_HOST, AIO_HTTPS_PORT, AIO_MQTTS_PORT, Config, Settings},
    hardware::EmbassyTime,
    logic::AppLogic,
    link_buffers,
    model::SUBSCRIPTION_FEEDS,
    net::TlsConnector,
    runner::Runner,
};

const CLIENT_ID: &str = "plantview-mqtt";

esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(spawner: Spawner) {
    esp_println::logger::init_logger_from_env();
    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_println::println!("=== Plantview (MQTT) ===");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => panic!("[ERROR] {}", e),
    };
    let settings = Settings::new();

    let board = match board::bring_up(&spawner, peripherals, &config) {
        Ok(board) => board,
        Err(e) => panic!("[ERROR] Bring-up failed: {}", e),
    };

    let mut broker = TlsConnector::new(board.stack, link_buffers!());
    let web = TlsConnector::new(board.stack, link_buffers!());
    let mut time_service = HttpSession::new(
        web,
        AIO_HOST,
        AIO_HTTPS_PORT,
        config.aio_username,
        config.aio_key,
    );

    let options = MqttOptions {
        client_id: CLIENT_ID,
        username: config.aio_username,
        key: config.aio_key,
        keep_alive_secs: settings.keep_alive_secs,
        connect_timeout_ms: settings.connect_timeout_ms,
        pump_wait_ms: settings.pump_wait_ms,
    };

    let mut app = AppLogic::new(SUBSCRIPTION_FEEDS, &settings);
    let mut runner = Runner::new(board.radio, board.light, board.panel, EmbassyTime, settings);

    let Err(e) = runner
        .run_subscription(
            &mut app,
            &mut broker,
            &mut time_service,
            (AIO_HOST, AIO_MQTTS_PORT),
            options,
        )
        .await;
    panic!("[ERROR] {}", e);
}
