//! GPIO pin driver for the tri-color indicator.

use super::IndicatorPins;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_sys::EspError;
use log::warn;

/// Indicator wired to three push-pull GPIO outputs.
pub struct GpioPins<'d> {
    red: PinDriver<'d, AnyOutputPin, Output>,
    green: PinDriver<'d, AnyOutputPin, Output>,
    blue: PinDriver<'d, AnyOutputPin, Output>,
}

impl<'d> GpioPins<'d> {
    pub fn new(
        red: AnyOutputPin,
        green: AnyOutputPin,
        blue: AnyOutputPin,
    ) -> Result<Self, EspError> {
        Ok(Self {
            red: PinDriver::output(red)?,
            green: PinDriver::output(green)?,
            blue: PinDriver::output(blue)?,
        })
    }
}

impl IndicatorPins for GpioPins<'_> {
    fn set(&mut self, red: bool, green: bool, blue: bool) {
        // Level writes only fail on a misconfigured driver; log once per
        // call rather than propagating through every render.
        if let Err(e) = self
            .red
            .set_level(red.into())
            .and(self.green.set_level(green.into()))
            .and(self.blue.set_level(blue.into()))
        {
            warn!("indicator pin write failed: {:?}", e);
        }
    }
}
