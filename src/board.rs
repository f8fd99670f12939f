//! Peripheral and network bring-up shared by both firmware images

use embassy_executor::Spawner;
use embassy_net::{Stack, StackResources};
use esp_hal::{gpio::Output, peripherals::Peripherals, rng::Rng, timer::timg::TimerGroup};
use esp_radio::Controller;

use crate::config::Config;
use crate::display::{Panel, Tft, init_tft};
use crate::hardware::{DisplayHardware, StatusLed};
use crate::net::net_task;
use crate::wifi::WifiRadio;

/// Size of each TCP socket buffer
pub const SOCKET_BUFFER_LEN: usize = 2048;
/// Room for one full 16 KiB TLS record plus header and tag
pub const TLS_READ_BUFFER_LEN: usize = 16_640;
pub const TLS_WRITE_BUFFER_LEN: usize = 4096;

#[macro_export]
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// Fresh static socket and TLS record buffers for one connector.
#[macro_export]
macro_rules! link_buffers {
    () => {{
        use $crate::board::{SOCKET_BUFFER_LEN, TLS_READ_BUFFER_LEN, TLS_WRITE_BUFFER_LEN};
        $crate::net::LinkBuffers {
            rx: $crate::mk_static!([u8; SOCKET_BUFFER_LEN], [0u8; SOCKET_BUFFER_LEN]),
            tx: $crate::mk_static!([u8; SOCKET_BUFFER_LEN], [0u8; SOCKET_BUFFER_LEN]),
            record_rx: $crate::mk_static!([u8; TLS_READ_BUFFER_LEN], [0u8; TLS_READ_BUFFER_LEN]),
            record_tx: $crate::mk_static!([u8; TLS_WRITE_BUFFER_LEN], [0u8; TLS_WRITE_BUFFER_LEN]),
        }
    }};
}

pub struct Board {
    pub radio: WifiRadio<'static>,
    pub light: StatusLed<'static>,
    pub panel: Panel<Tft<'static>>,
    pub stack: Stack<'static>,
    // Held so the backlight stays on.
    _backlight: Output<'static>,
}

/// Bring up the timer, heap, TFT, status LED, Wi-Fi controller and network
/// stack, and spawn the network runner. Does not join the network.
pub fn bring_up(
    spawner: &Spawner,
    peripherals: Peripherals,
    config: &Config,
) -> Result<Board, &'static str> {
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Display: CS GPIO10, MOSI GPIO11, SCK GPIO12, DC GPIO13, RST GPIO14, backlight GPIO15
    let display = DisplayHardware::new(
        peripherals.SPI2,
        peripherals.GPIO10,
        peripherals.GPIO11,
        peripherals.GPIO12,
        peripherals.GPIO13,
        peripherals.GPIO14,
        peripherals.GPIO15,
    )?;
    let buffer = mk_static!([u8; 512], [0u8; 512]);
    let (tft, backlight) = init_tft(display, buffer)?;

    let light = StatusLed::new(peripherals.GPIO21);

    esp_alloc::heap_allocator!(size: 72 * 1024);

    esp_println::println!("[WIFI] Initializing radio");
    let radio_init = esp_radio::init().map_err(|_| "Radio init failed")?;
    let radio_ctrl = &*mk_static!(Controller<'static>, radio_init);
    let (controller, interfaces) =
        esp_radio::wifi::new(radio_ctrl, peripherals.WIFI, Default::default())
            .map_err(|_| "WiFi init failed")?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        mk_static!(StackResources<4>, StackResources::<4>::new()),
        seed,
    );
    spawner
        .spawn(net_task(runner))
        .map_err(|_| "Failed to spawn network task")?;
    esp_println::println!("[WIFI] Network stack running");

    Ok(Board {
        radio: WifiRadio::new(controller, stack, config.wifi_ssid, config.wifi_password),
        light,
        panel: Panel::new(tft),
        stack,
        _backlight: backlight,
    })
}
