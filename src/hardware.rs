use embassy_time::{Duration, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::gpio::AnyPin;
use esp_hal::{
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    peripherals::SPI2,
    spi::master::{Config as SpiConfig, Spi},
    time::Rate,
};

use crate::display::TftSpi;
use crate::traits::{LightPhase, StatusLight, TimeBase};

const SPI_FREQ_MHZ: u32 = 40;

/// SPI bus and control pins of the TFT panel.
pub struct DisplayHardware<'a> {
    pub spi: TftSpi<'a>,
    pub dc: Output<'a>,
    pub rst: Output<'a>,
    pub backlight: Output<'a>,
    pub delay: Delay,
}

impl<'a> DisplayHardware<'a> {
    pub fn new<CS, MOSI, SCK, DC, RST, LITE>(
        spi_periph: SPI2<'a>,
        cs_gpio: CS,
        mosi_gpio: MOSI,
        sck_gpio: SCK,
        dc_gpio: DC,
        rst_gpio: RST,
        backlight_gpio: LITE,
    ) -> Result<Self, &'static str>
    where
        CS: Into<AnyPin<'a>>,
        MOSI: Into<AnyPin<'a>>,
        SCK: Into<AnyPin<'a>>,
        DC: Into<AnyPin<'a>>,
        RST: Into<AnyPin<'a>>,
        LITE: Into<AnyPin<'a>>,
    {
        let spi_bus = Spi::new(
            spi_periph,
            SpiConfig::default().with_frequency(Rate::from_mhz(SPI_FREQ_MHZ)),
        )
        .map_err(|_| "Failed to configure SPI bus")?
        .with_sck(sck_gpio.into())
        .with_mosi(mosi_gpio.into());

        let cs = Output::new(cs_gpio.into(), Level::High, OutputConfig::default());
        let dc = Output::new(dc_gpio.into(), Level::Low, OutputConfig::default());
        let rst = Output::new(rst_gpio.into(), Level::High, OutputConfig::default());
        let backlight = Output::new(backlight_gpio.into(), Level::Low, OutputConfig::default());

        let spi = ExclusiveDevice::new(spi_bus, cs, Delay::new())
            .map_err(|_| "Failed to claim SPI chip select")?;

        Ok(Self {
            spi,
            dc,
            rst,
            backlight,
            delay: Delay::new(),
        })
    }
}

/// Single LED: lit while connecting, blinking on faults, dark once online.
pub struct StatusLed<'a> {
    pin: Output<'a>,
}

impl<'a> StatusLed<'a> {
    pub fn new<P: Into<AnyPin<'a>>>(gpio: P) -> Self {
        Self {
            pin: Output::new(gpio.into(), Level::Low, OutputConfig::default()),
        }
    }
}

impl StatusLight for StatusLed<'_> {
    fn show(&mut self, phase: LightPhase) {
        match phase {
            LightPhase::Connecting => self.pin.set_high(),
            LightPhase::Fault => self.pin.toggle(),
            LightPhase::Off => self.pin.set_low(),
        }
    }
}

/// Embassy's monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyTime;

impl TimeBase for EmbassyTime {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    async fn sleep_ms(&mut self, ms: u64) {
        Timer::after(Duration::from_millis(ms)).await;
    }
}
