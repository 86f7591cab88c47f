//! Touch pads on the STM32F0 GPIOA analog pins.
//!
//! PA0 through PA7 map directly onto ADC channels 0 through 7. The pad is
//! charged by switching the pin to a push-pull output driven high, then
//! switched to analog mode and converted while the charge leaks away.
//!
//! Like the rest of the register access in this crate, the ADC, GPIOA and RCC
//! blocks are used directly through the PAC rather than taken as owned
//! peripherals. Only touch pins may use the ADC.

use stm32f0::stm32f0x1 as pac;
use thiserror::Error;

use crate::pin::SensePin;

/// Bound on busy-wait loops for ADC flags
const SPIN_LIMIT: u32 = 100_000;

// RCC enable bits
const RCC_AHBENR_IOPAEN: u32 = 1 << 17;
const RCC_APB2ENR_ADCEN: u32 = 1 << 9;

// ADC register bits
const ADC_CR_ADEN: u32 = 1 << 0;
const ADC_CR_ADSTART: u32 = 1 << 2;
const ADC_CR_ADCAL: u32 = 1 << 31;
const ADC_ISR_ADRDY: u32 = 1 << 0;
const ADC_ISR_EOC: u32 = 1 << 2;
const ADC_CFGR1_RES_MASK: u32 = 0b11 << 3;
const ADC_CFGR1_RES_10BIT: u32 = 0b01 << 3;
/// 28.5 ADC clock cycles
const ADC_SMPR_SAMPLE_TIME: u32 = 0b011;

const MODER_OUTPUT: u32 = 0b01;
const MODER_ANALOG: u32 = 0b11;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdcError {
    #[error("PA{0} has no ADC channel")]
    NoChannel(u8),

    #[error("ADC calibration did not finish")]
    CalibrationTimeout,

    #[error("ADC did not become ready")]
    EnableTimeout,

    #[error("ADC conversion did not finish")]
    ConversionTimeout,
}

/// A touch pad on GPIOA pin `PAn`, sampled through ADC channel `n`
pub struct AdcTouchPin {
    pin: u8,
    gpio: &'static pac::gpioa::RegisterBlock,
    adc: &'static pac::adc::RegisterBlock,
}

impl AdcTouchPin {
    /// Claim `PAn` as a touch pad, bringing up the ADC at 10-bit resolution on
    /// first use
    pub fn new(pin: u8) -> Result<Self, AdcError> {
        if pin > 7 {
            return Err(AdcError::NoChannel(pin));
        }

        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.ahbenr.modify(|r, w| unsafe { w.bits(r.bits() | RCC_AHBENR_IOPAEN) });
        rcc.apb2enr.modify(|r, w| unsafe { w.bits(r.bits() | RCC_APB2ENR_ADCEN) });

        let adc = unsafe { &*pac::ADC::ptr() };
        if adc.cr.read().bits() & ADC_CR_ADEN == 0 {
            // Calibration is only allowed while the ADC is disabled
            adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADCAL) });
            spin_until(|| adc.cr.read().bits() & ADC_CR_ADCAL == 0, AdcError::CalibrationTimeout)?;

            adc.cfgr1.modify(|r, w| unsafe {
                w.bits((r.bits() & !ADC_CFGR1_RES_MASK) | ADC_CFGR1_RES_10BIT)
            });
            adc.smpr.write(|w| unsafe { w.bits(ADC_SMPR_SAMPLE_TIME) });

            adc.isr.write(|w| unsafe { w.bits(ADC_ISR_ADRDY) });
            adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADEN) });
            spin_until(|| adc.isr.read().bits() & ADC_ISR_ADRDY != 0, AdcError::EnableTimeout)?;
        }

        let gpio = unsafe { &*pac::GPIOA::ptr() };
        let mut touch = Self { pin, gpio, adc };
        touch.set_mode(MODER_ANALOG);
        Ok(touch)
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    fn set_mode(&mut self, mode: u32) {
        let shift = 2 * self.pin as u32;
        self.gpio
            .moder
            .modify(|r, w| unsafe { w.bits((r.bits() & !(0b11 << shift)) | (mode << shift)) });
    }
}

impl SensePin for AdcTouchPin {
    type Error = AdcError;

    fn drive(&mut self, active: bool) -> Result<(), AdcError> {
        let bit = if active { self.pin } else { self.pin + 16 };
        self.gpio.bsrr.write(|w| unsafe { w.bits(1 << bit) });
        // Released pads are held low so they start each sample discharged
        self.set_mode(MODER_OUTPUT);
        Ok(())
    }

    fn read_analog(&mut self) -> Result<u16, AdcError> {
        self.set_mode(MODER_ANALOG);
        self.adc.chselr.write(|w| unsafe { w.bits(1 << self.pin) });
        self.adc.cr.modify(|r, w| unsafe { w.bits(r.bits() | ADC_CR_ADSTART) });
        let adc = self.adc;
        spin_until(|| adc.isr.read().bits() & ADC_ISR_EOC != 0, AdcError::ConversionTimeout)?;
        // Reading DR clears EOC
        Ok(self.adc.dr.read().bits() as u16)
    }
}

fn spin_until(mut done: impl FnMut() -> bool, err: AdcError) -> Result<(), AdcError> {
    for _ in 0..SPIN_LIMIT {
        if done() {
            return Ok(());
        }
    }
    Err(err)
}
