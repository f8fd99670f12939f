//! The seven on-screen widgets and how they are drawn

use embedded_graphics::{
    geometry::Angle,
    mono_font::{
        MonoFont, MonoTextStyle,
        iso_8859_1::{FONT_6X13, FONT_10X20},
        mapping::GlyphMapping,
    },
    pixelcolor::{Rgb565, Rgb888},
    prelude::*,
    primitives::{Arc, Circle, Line, PrimitiveStyle, Rectangle, RoundedRectangle, Triangle},
    text::{Baseline, Text},
};
use heapless::String;

use crate::model::Channel;

pub const WIDGET_COUNT: usize = 7;

pub const TEMPERATURE_RGB: u32 = 0xDC1B1B;
pub const HUMIDITY_RGB: u32 = 0x4F8BE3;
pub const GAS_RGB: u32 = 0x04C60A;
pub const CAPTION_RGB: u32 = 0xFFFFFF;

/// Missing from the ISO 8859-1 fonts, drawn with primitives instead.
pub const OMEGA: char = '\u{03a9}';

const VALUE_PLACEHOLDER: &str = "N/A";
const CAPTION_PLACEHOLDER: &str = "No updates";

/// Pixel width reserved for a value or caption label.
const LABEL_WIDTH: u32 = 190;

pub fn rgb(hex: u32) -> Rgb565 {
    Rgb888::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8).into()
}

/// Fixed slots in the scene, in draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetId {
    TemperatureText = 0,
    HumidityText = 1,
    GasText = 2,
    TemperatureIcon = 3,
    HumidityIcon = 4,
    GasIcon = 5,
    UpdatedText = 6,
}

impl WidgetId {
    pub fn value_label(channel: Channel) -> Self {
        match channel {
            Channel::Temperature => WidgetId::TemperatureText,
            Channel::Humidity => WidgetId::HumidityText,
            Channel::Gas => WidgetId::GasText,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Thermometer,
    Droplet,
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Value,
    Caption,
}

impl TextSize {
    fn font(self) -> &'static MonoFont<'static> {
        match self {
            TextSize::Value => &FONT_10X20,
            TextSize::Caption => &FONT_6X13,
        }
    }

    /// Whether `c` comes out as itself rather than the font's `?` fallback.
    pub fn can_draw(self, c: char) -> bool {
        let mapping = self.font().glyph_mapping;
        c == '?' || c == OMEGA || mapping.index(c) != mapping.index('?')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Icon(Glyph),
    Text(TextSize, String<32>),
}

#[derive(Debug, Clone)]
pub struct Widget {
    /// Left edge and vertical center
    pub position: Point,
    pub color: Rgb565,
    pub content: Content,
    dirty: bool,
}

impl Widget {
    fn icon(glyph: Glyph, x: i32, y: i32, color: Rgb565) -> Self {
        Self {
            position: Point::new(x, y),
            color,
            content: Content::Icon(glyph),
            dirty: true,
        }
    }

    fn label(size: TextSize, text: &str, x: i32, y: i32, color: Rgb565) -> Self {
        let mut content = String::new();
        let _ = content.push_str(text);
        Self {
            position: Point::new(x, y),
            color,
            content: Content::Text(size, content),
            dirty: true,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(_, text) => Some(text.as_str()),
            Content::Icon(_) => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Screen area this widget may paint.
    pub fn area(&self) -> Rectangle {
        match &self.content {
            Content::Icon(_) => {
                Rectangle::with_center(self.position + Point::new(20, 0), Size::new(40, 44))
            }
            Content::Text(size, _) => {
                let height = size.font().character_size.height;
                Rectangle::new(
                    Point::new(self.position.x, self.position.y - height as i32 / 2),
                    Size::new(LABEL_WIDTH, height),
                )
            }
        }
    }

    fn draw<D>(&self, target: &mut D, background: Rgb565) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.fill_solid(&self.area(), background)?;
        match &self.content {
            Content::Text(size, text) => {
                draw_text(target, text, *size, self.position, self.color)?;
            }
            Content::Icon(glyph) => draw_glyph(target, *glyph, self.position, self.color)?,
        }
        Ok(())
    }
}

fn draw_text<D>(
    target: &mut D,
    text: &str,
    size: TextSize,
    origin: Point,
    color: Rgb565,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let font = size.font();
    let style = MonoTextStyle::new(font, color);
    let advance = (font.character_size.width + font.character_spacing) as i32;
    let mut cursor = origin;
    for (i, run) in text.split(OMEGA).enumerate() {
        if i > 0 {
            draw_omega(target, cursor, font.character_size.width as i32, color)?;
            cursor.x += advance;
        }
        if !run.is_empty() {
            cursor = Text::with_baseline(run, cursor, style, Baseline::Middle).draw(target)?;
        }
    }
    Ok(())
}

/// Omega in a `width`-wide cell, vertically centered on `origin.y`.
fn draw_omega<D>(target: &mut D, origin: Point, width: i32, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let stroke = PrimitiveStyle::with_stroke(color, 2);
    let diameter = width - 1;
    let top = origin + Point::new(0, -diameter / 2 - 2);
    Arc::new(top, diameter as u32, Angle::from_degrees(120.0), Angle::from_degrees(300.0))
        .into_styled(stroke)
        .draw(target)?;

    let foot_y = origin.y + diameter / 2 + 1;
    let left = origin.x + diameter / 4;
    let right = origin.x + diameter - diameter / 4;
    for (from, to) in [
        (Point::new(left, foot_y - 3), Point::new(left, foot_y)),
        (Point::new(right, foot_y - 3), Point::new(right, foot_y)),
        (Point::new(origin.x, foot_y), Point::new(left, foot_y)),
        (Point::new(right, foot_y), Point::new(origin.x + diameter, foot_y)),
    ] {
        Line::new(from, to).into_styled(stroke).draw(target)?;
    }
    Ok(())
}

fn draw_glyph<D>(target: &mut D, glyph: Glyph, origin: Point, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let fill = PrimitiveStyle::with_fill(color);
    let center = origin + Point::new(20, 0);
    match glyph {
        Glyph::Thermometer => {
            RoundedRectangle::with_equal_corners(
                Rectangle::new(center + Point::new(-4, -20), Size::new(9, 30)),
                Size::new(4, 4),
            )
            .into_styled(fill)
            .draw(target)?;
            Circle::with_center(center + Point::new(0, 12), 16)
                .into_styled(fill)
                .draw(target)?;
        }
        Glyph::Droplet => {
            Triangle::new(
                center + Point::new(0, -20),
                center + Point::new(-11, 4),
                center + Point::new(11, 4),
            )
            .into_styled(fill)
            .draw(target)?;
            Circle::with_center(center + Point::new(0, 7), 24)
                .into_styled(fill)
                .draw(target)?;
        }
        Glyph::Leaf => {
            Circle::with_center(center + Point::new(-7, 2), 22)
                .into_styled(fill)
                .draw(target)?;
            Circle::with_center(center + Point::new(7, -6), 22)
                .into_styled(fill)
                .draw(target)?;
            Rectangle::new(center + Point::new(-1, 8), Size::new(3, 14))
                .into_styled(fill)
                .draw(target)?;
        }
    }
    Ok(())
}

/// Fixed widget set attached to the panel. Only dirty widgets are repainted.
#[derive(Debug, Clone)]
pub struct Scene {
    widgets: [Widget; WIDGET_COUNT],
    background: Rgb565,
}

impl Scene {
    pub fn new() -> Self {
        let red = rgb(TEMPERATURE_RGB);
        let blue = rgb(HUMIDITY_RGB);
        let green = rgb(GAS_RGB);
        let white = rgb(CAPTION_RGB);

        Self {
            widgets: [
                Widget::label(TextSize::Value, VALUE_PLACEHOLDER, 120, 50, red),
                Widget::label(TextSize::Value, VALUE_PLACEHOLDER, 120, 110, blue),
                Widget::label(TextSize::Value, VALUE_PLACEHOLDER, 120, 170, green),
                Widget::icon(Glyph::Thermometer, 30, 50, red),
                Widget::icon(Glyph::Droplet, 30, 110, blue),
                Widget::icon(Glyph::Leaf, 30, 170, green),
                Widget::label(TextSize::Caption, CAPTION_PLACEHOLDER, 80, 220, white),
            ],
            background: Rgb565::BLACK,
        }
    }

    pub fn widget(&self, id: WidgetId) -> &Widget {
        &self.widgets[id as usize]
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn text(&self, id: WidgetId) -> Option<&str> {
        self.widget(id).text()
    }

    /// Replace a label's text. Icons are left alone.
    pub fn set_text(&mut self, id: WidgetId, text: &str) {
        let widget = &mut self.widgets[id as usize];
        if let Content::Text(_, current) = &mut widget.content {
            if current.as_str() != text {
                current.clear();
                let _ = current.push_str(text);
                widget.dirty = true;
            }
        }
    }

    /// Force a full repaint on the next render.
    pub fn invalidate(&mut self) {
        for widget in self.widgets.iter_mut() {
            widget.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.widgets.iter().any(Widget::is_dirty)
    }

    /// Draw every dirty widget and mark it clean. Returns how many were drawn.
    pub fn render<D>(&mut self, target: &mut D) -> Result<usize, D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let mut drawn = 0;
        for widget in self.widgets.iter_mut() {
            if widget.dirty {
                widget.draw(target, self.background)?;
                widget.dirty = false;
                drawn += 1;
            }
        }
        Ok(drawn)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_graphics::{Pixel, primitives::ContainsPoint};

    /// 320x240 target that only counts what lands on it.
    pub(crate) struct CountingPanel {
        pub pixels: usize,
        pub out_of_bounds: usize,
    }

    impl CountingPanel {
        pub(crate) fn new() -> Self {
            Self {
                pixels: 0,
                out_of_bounds: 0,
            }
        }
    }

    impl OriginDimensions for CountingPanel {
        fn size(&self) -> Size {
            Size::new(320, 240)
        }
    }

    impl DrawTarget for CountingPanel {
        type Color = Rgb565;
        type Error = core::convert::Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            let bounds = self.bounding_box();
            for Pixel(point, _) in pixels {
                if bounds.contains(point) {
                    self.pixels += 1;
                } else {
                    self.out_of_bounds += 1;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn fresh_scene_shows_placeholders() {
        let scene = Scene::new();
        assert_eq!(scene.text(WidgetId::TemperatureText), Some("N/A"));
        assert_eq!(scene.text(WidgetId::HumidityText), Some("N/A"));
        assert_eq!(scene.text(WidgetId::GasText), Some("N/A"));
        assert_eq!(scene.text(WidgetId::UpdatedText), Some("No updates"));
        assert_eq!(scene.text(WidgetId::GasIcon), None);
        assert_eq!(scene.widgets().len(), WIDGET_COUNT);
    }

    #[test]
    fn first_render_draws_everything_on_screen() {
        let mut scene = Scene::new();
        let mut panel = CountingPanel::new();
        assert_eq!(scene.render(&mut panel).unwrap(), WIDGET_COUNT);
        assert!(panel.pixels > 0);
        assert_eq!(panel.out_of_bounds, 0);
        assert!(!scene.is_dirty());
        assert_eq!(scene.render(&mut panel).unwrap(), 0);
    }

    #[test]
    fn only_changed_labels_are_repainted() {
        let mut scene = Scene::new();
        let mut panel = CountingPanel::new();
        scene.render(&mut panel).unwrap();

        scene.set_text(WidgetId::HumidityText, "55 %");
        scene.set_text(WidgetId::GasText, "N/A");
        assert_eq!(scene.render(&mut panel).unwrap(), 1);

        scene.invalidate();
        assert_eq!(scene.render(&mut panel).unwrap(), WIDGET_COUNT);
    }

    #[test]
    fn icons_ignore_text_updates() {
        let mut scene = Scene::new();
        let mut panel = CountingPanel::new();
        scene.render(&mut panel).unwrap();
        scene.set_text(WidgetId::TemperatureIcon, "hot");
        assert!(!scene.is_dirty());
    }

    /// Records where the foreground color lands.
    struct InkPanel {
        ink: Rgb565,
        points: std::vec::Vec<Point>,
    }

    impl OriginDimensions for InkPanel {
        fn size(&self) -> Size {
            Size::new(320, 240)
        }
    }

    impl DrawTarget for InkPanel {
        type Color = Rgb565;
        type Error = core::convert::Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            for Pixel(point, color) in pixels {
                if color == self.ink {
                    self.points.push(point);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn unit_characters_have_glyphs() {
        use crate::model::{POLLING_FEEDS, SUBSCRIPTION_FEEDS};

        for feeds in [POLLING_FEEDS, SUBSCRIPTION_FEEDS] {
            for c in feeds.gas_unit.chars().chain("F\u{00b0} %".chars()) {
                assert!(TextSize::Value.can_draw(c), "no glyph for {:?}", c);
            }
        }
        assert!(TextSize::Caption.can_draw(':'));
        assert!(!TextSize::Value.can_draw('\u{03b2}'));
    }

    #[test]
    fn omega_is_painted_in_its_own_cell() {
        let green = rgb(GAS_RGB);
        let cell_x = 120 + 4 * 10;
        let mut ohms = InkPanel { ink: green, points: std::vec::Vec::new() };
        draw_text(&mut ohms, "120 \u{03a9}", TextSize::Value, Point::new(120, 170), green)
            .unwrap();
        assert!(ohms.points.iter().any(|p| p.x >= cell_x && p.x < cell_x + 10));

        let mut plain = InkPanel { ink: green, points: std::vec::Vec::new() };
        draw_text(&mut plain, "120 ", TextSize::Value, Point::new(120, 170), green).unwrap();
        assert!(plain.points.iter().all(|p| p.x < cell_x));
    }

    #[test]
    fn palette_matches_widget_colors() {
        let scene = Scene::new();
        assert_eq!(scene.widget(WidgetId::TemperatureText).color, rgb(TEMPERATURE_RGB));
        assert_eq!(scene.widget(WidgetId::GasIcon).color, rgb(GAS_RGB));
        assert_eq!(rgb(0xFFFFFF), Rgb565::WHITE);
    }
}
