use embedded_graphics::{pixelcolor::Rgb565, prelude::*};

use crate::error::Error;
use crate::scene::Scene;
use crate::traits::Screen;

/// Any RGB565 draw target, painted from a `Scene`.
pub struct Panel<D> {
    target: D,
}

impl<D> Panel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    pub fn new(target: D) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    /// Blank the whole panel. The next refresh must repaint every widget.
    pub fn clear(&mut self, scene: &mut Scene) -> Result<(), Error> {
        self.target
            .clear(Rgb565::BLACK)
            .map_err(|_| Error::Io("Failed to clear display"))?;
        scene.invalidate();
        Ok(())
    }
}

impl<D> Screen for Panel<D>
where
    D: DrawTarget<Color = Rgb565>,
{
    fn refresh(&mut self, scene: &mut Scene) -> Result<(), Error> {
        let drawn = scene
            .render(&mut self.target)
            .map_err(|_| Error::Io("Failed to draw widgets"))?;
        if drawn > 0 {
            log::debug!("Repainted {} widgets", drawn);
        }
        Ok(())
    }
}

#[cfg(feature = "device")]
pub use tft::{Tft, TftSpi, init_tft};

#[cfg(feature = "device")]
mod tft {
    use embedded_hal_bus::spi::ExclusiveDevice;
    use esp_hal::{delay::Delay, gpio::Output, spi::master::Spi};
    use mipidsi::{
        Builder, Display,
        interface::SpiInterface,
        models::ILI9341Rgb565,
        options::{ColorOrder, Orientation, Rotation},
    };

    use crate::hardware::DisplayHardware;

    pub const WIDTH: u16 = 240;
    pub const HEIGHT: u16 = 320;

    pub type TftSpi<'a> = ExclusiveDevice<Spi<'a, esp_hal::Blocking>, Output<'a>, Delay>;

    /// ILI9341 in landscape, 320x240 as seen by the scene.
    pub type Tft<'a> = Display<
        SpiInterface<'a, TftSpi<'a>, Output<'a>>,
        ILI9341Rgb565,
        Output<'a>,
    >;

    /// Reset and configure the panel, then switch the backlight on.
    ///
    /// The backlight pin comes back with the display; dropping it turns the
    /// backlight off.
    pub fn init_tft<'a>(
        hw: DisplayHardware<'a>,
        buffer: &'a mut [u8],
    ) -> Result<(Tft<'a>, Output<'a>), &'static str> {
        esp_println::println!("[TFT] Initializing ILI9341 320x240");

        let DisplayHardware {
            spi,
            dc,
            rst,
            mut backlight,
            mut delay,
        } = hw;

        let interface = SpiInterface::new(spi, dc, buffer);
        let display = Builder::new(ILI9341Rgb565, interface)
            .reset_pin(rst)
            .display_size(WIDTH, HEIGHT)
            .orientation(Orientation::new().rotate(Rotation::Deg90))
            .color_order(ColorOrder::Bgr)
            .init(&mut delay)
            .map_err(|_| "Failed to initialize display")?;

        backlight.set_high();
        esp_println::println!("[TFT] Display ready");
        Ok((display, backlight))
    }
}
