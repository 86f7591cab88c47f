use core::fmt::Debug;

use embedded_hal::digital::{OutputPin, PinState};

/// A pin that can charge a touch pad and read it back through the ADC.
pub trait SensePin {
    type Error: Debug;

    /// Drive the pad high (`true`) or release it (`false`)
    fn drive(&mut self, active: bool) -> Result<(), Self::Error>;

    /// Take one raw analog reading, 0..=1023 on a 10-bit converter
    fn read_analog(&mut self) -> Result<u16, Self::Error>;
}

impl<T: SensePin + ?Sized> SensePin for &mut T {
    type Error = T::Error;

    fn drive(&mut self, active: bool) -> Result<(), Self::Error> {
        (**self).drive(active)
    }

    fn read_analog(&mut self) -> Result<u16, Self::Error> {
        (**self).read_analog()
    }
}

/// Touch pin assembled from a digital output and a separate ADC conversion,
/// for HALs that hand out the two halves of a pin independently.
pub struct SplitPin<O, F> {
    output: O,
    convert: F,
}

impl<O, F> SplitPin<O, F>
where
    O: OutputPin,
    F: FnMut() -> u16,
{
    pub fn new(output: O, convert: F) -> Self {
        Self { output, convert }
    }

    pub fn release(self) -> (O, F) {
        (self.output, self.convert)
    }
}

impl<O, F> SensePin for SplitPin<O, F>
where
    O: OutputPin,
    F: FnMut() -> u16,
{
    type Error = O::Error;

    fn drive(&mut self, active: bool) -> Result<(), Self::Error> {
        self.output.set_state(PinState::from(active))
    }

    fn read_analog(&mut self) -> Result<u16, Self::Error> {
        Ok((self.convert)())
    }
}
