//! On-die temperature sampler.
//!
//! The RP2040 routes an internal temperature diode to ADC input 4. The
//! conversion is the datasheet one (section 4.9.5): the 12-bit code is
//! scaled against the 3.3 V reference and mapped linearly to degrees,
//! `T = 27 - (V - 0.706) / 0.001721`.
//!
//! There is no error path. Codes outside the sensor's useful range simply
//! produce temperatures outside the useful range; nothing is clamped.

use crate::log::debug;

/// ADC reference voltage in volts.
pub const ADC_VREF: f32 = 3.3;

/// Full-scale code of the 12-bit ADC.
pub const ADC_FULL_SCALE: f32 = 4095.0;

/// Diode voltage at 27 °C.
pub const VBE_AT_27C: f32 = 0.706;

/// Diode slope in volts per degree (negative slope folded into the formula).
pub const VBE_SLOPE: f32 = 0.001721;

/// Raw access to the ADC channel wired to the temperature diode.
pub trait DieTemperatureAdc {
    /// Routes the ADC mux to the temperature diode.
    ///
    /// Called before every read; selecting an already selected input is
    /// harmless.
    fn select_temperature_input(&mut self);

    /// One conversion on the selected input, 0-4095.
    fn read_raw(&mut self) -> u16;
}

/// Converts a raw ADC code to the voltage seen at the input.
pub fn raw_to_voltage(raw: u16) -> f32 {
    raw as f32 * ADC_VREF / ADC_FULL_SCALE
}

/// Converts a diode voltage to degrees Celsius.
pub fn voltage_to_celsius(voltage: f32) -> f32 {
    27.0 - (voltage - VBE_AT_27C) / VBE_SLOPE
}

/// Converts a raw ADC code straight to degrees Celsius.
pub fn raw_to_celsius(raw: u16) -> f32 {
    voltage_to_celsius(raw_to_voltage(raw))
}

/// Samples the die temperature through a [`DieTemperatureAdc`].
pub struct DieTemperatureSampler<A> {
    adc: A,
}

impl<A: DieTemperatureAdc> DieTemperatureSampler<A> {
    /// Creates a sampler over the ADC.
    ///
    /// # Arguments
    ///
    /// * `adc` - ADC with the die temperature diode as one of its inputs
    pub fn new(adc: A) -> Self {
        Self { adc }
    }

    /// Reads the die temperature in degrees Celsius.
    pub fn read_die_temperature(&mut self) -> f32 {
        self.adc.select_temperature_input();
        let raw = self.adc.read_raw();
        let celsius = raw_to_celsius(raw);

        debug!("die temperature: raw={} -> {} C", raw, celsius);

        celsius
    }

    /// Gives the ADC back.
    pub fn release(self) -> A {
        self.adc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedAdc {
        code: u16,
        selects: u32,
        reads: u32,
    }

    impl DieTemperatureAdc for FixedAdc {
        fn select_temperature_input(&mut self) {
            self.selects += 1;
        }

        fn read_raw(&mut self) -> u16 {
            assert_eq!(self.selects, self.reads + 1, "input not selected before read");
            self.reads += 1;
            self.code
        }
    }

    fn close(a: f32, b: f32, tolerance: f32) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn reference_voltage_is_27_degrees() {
        assert!(close(voltage_to_celsius(0.706), 27.0, 1e-4));
    }

    #[test]
    fn code_scales_against_vref() {
        assert!(close(raw_to_voltage(0), 0.0, 1e-6));
        assert!(close(raw_to_voltage(4095), 3.3, 1e-5));
        assert!(close(raw_to_voltage(2048), 2048.0 * 3.3 / 4095.0, 1e-6));
    }

    #[test]
    fn sample_points_follow_calibration() {
        // 876 counts is 0.70593 V, just under the 27 °C point.
        assert!(close(raw_to_celsius(876), 27.0 - (0.705_934 - 0.706) / 0.001721, 0.01));
        assert!(close(raw_to_celsius(876), 27.04, 0.01));
        // Colder die -> higher diode voltage -> higher code.
        assert!(raw_to_celsius(900) < raw_to_celsius(876));
        assert!(close(raw_to_celsius(0), 27.0 + 0.706 / 0.001721, 0.01));
    }

    #[test]
    fn conversion_is_affine() {
        let step = raw_to_celsius(101) - raw_to_celsius(100);
        for raw in [0u16, 500, 876, 2048, 4000] {
            let next = raw_to_celsius(raw + 1) - raw_to_celsius(raw);
            assert!(close(next, step, 1e-3));
        }
    }

    #[test]
    fn out_of_range_codes_are_not_clamped() {
        let hot = raw_to_celsius(0);
        let cold = raw_to_celsius(4095);
        assert!(hot > 400.0);
        assert!(cold < -1000.0);
    }

    #[test]
    fn sampler_selects_input_on_every_read() {
        let mut sampler = DieTemperatureSampler::new(FixedAdc {
            code: 876,
            selects: 0,
            reads: 0,
        });

        let first = sampler.read_die_temperature();
        let second = sampler.read_die_temperature();
        assert_eq!(first, second);

        let adc = sampler.release();
        assert_eq!(adc.selects, 2);
        assert_eq!(adc.reads, 2);
    }
}
