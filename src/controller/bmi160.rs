//! Minimal BMI160 IMU driver over embedded-hal I2C.
//!
//! Only what the sampler needs: bring both sensors into normal mode and burst
//! read the gyro and accelerometer data registers.

use super::error::SensorError;
use super::motion::{MotionSample, MotionSensor};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use tracing::{debug, info};

const REG_CHIP_ID: u8 = 0x00;
/// GYR_X_L; gyro X/Y/Z then accel X/Y/Z, little endian.
const REG_DATA: u8 = 0x0C;
const REG_GYR_RANGE: u8 = 0x43;
const REG_CMD: u8 = 0x7E;

const CHIP_ID: u8 = 0xD1;
const CMD_ACC_NORMAL: u8 = 0x11;
const CMD_GYR_NORMAL: u8 = 0x15;
/// +-2000 deg/s
const GYR_RANGE_2000: u8 = 0x00;

// Power-up times from the datasheet, rounded up.
const ACC_STARTUP_MS: u32 = 5;
const GYR_STARTUP_MS: u32 = 81;

pub struct Bmi160<I2C> {
    i2c: I2C,
    address: u8,
}

fn bus_error<E: core::fmt::Debug>(e: E) -> SensorError {
    SensorError::Bus(format!("{e:?}"))
}

impl<I2C: I2c> Bmi160<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(bus_error)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(bus_error)
    }

    /// Verifies the chip and powers up both sensors.
    pub fn init(&mut self, delay: &mut impl DelayNs) -> Result<(), SensorError> {
        let id = self.read_register(REG_CHIP_ID)?;
        if id != CHIP_ID {
            return Err(SensorError::UnexpectedChipId(id));
        }

        self.write_register(REG_CMD, CMD_ACC_NORMAL)?;
        delay.delay_ms(ACC_STARTUP_MS);
        self.write_register(REG_CMD, CMD_GYR_NORMAL)?;
        delay.delay_ms(GYR_STARTUP_MS);
        self.write_register(REG_GYR_RANGE, GYR_RANGE_2000)?;

        info!("BMI160 at {:#04x} initialised", self.address);
        Ok(())
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c + Send> MotionSensor for Bmi160<I2C> {
    fn read_motion(&mut self) -> Result<MotionSample, SensorError> {
        let mut buf = [0u8; 12];
        self.i2c
            .write_read(self.address, &[REG_DATA], &mut buf)
            .map_err(bus_error)?;

        let word = |i: usize| i16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]);
        Ok(MotionSample {
            gyro: [word(0), word(1), word(2)],
            accel: [word(3), word(4), word(5)],
        })
    }
}

/// Opens the Linux I2C bus and brings up the sensor.
pub fn open(bus: &str, address: u8) -> Result<Bmi160<I2cdev>, SensorError> {
    debug!("Opening BMI160 on {} at {:#04x}", bus, address);
    let i2c = I2cdev::new(bus).map_err(|e| SensorError::Open {
        path: bus.to_string(),
        reason: e.to_string(),
    })?;
    let mut sensor = Bmi160::new(i2c, address);
    sensor.init(&mut linux_embedded_hal::Delay)?;
    Ok(sensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const ADDR: u8 = 0x68;

    #[test]
    fn init_powers_up_both_sensors() {
        let expectations = [
            Transaction::write_read(ADDR, vec![REG_CHIP_ID], vec![CHIP_ID]),
            Transaction::write(ADDR, vec![REG_CMD, CMD_ACC_NORMAL]),
            Transaction::write(ADDR, vec![REG_CMD, CMD_GYR_NORMAL]),
            Transaction::write(ADDR, vec![REG_GYR_RANGE, GYR_RANGE_2000]),
        ];
        let mut sensor = Bmi160::new(I2cMock::new(&expectations), ADDR);
        sensor.init(&mut NoopDelay::new()).unwrap();
        sensor.release().done();
    }

    #[test]
    fn wrong_chip_is_rejected() {
        let expectations = [Transaction::write_read(ADDR, vec![REG_CHIP_ID], vec![0x68])];
        let mut sensor = Bmi160::new(I2cMock::new(&expectations), ADDR);
        let err = sensor.init(&mut NoopDelay::new()).unwrap_err();
        assert!(matches!(err, SensorError::UnexpectedChipId(0x68)));
        sensor.release().done();
    }

    #[test]
    fn burst_read_decodes_little_endian() {
        let data = vec![
            0x10, 0x00, // gx 16
            0xF0, 0xFF, // gy -16
            0x00, 0x01, // gz 256
            0x00, 0x00, // ax
            0xFF, 0x7F, // ay 32767
            0x00, 0x40, // az 16384
        ];
        let expectations = [Transaction::write_read(ADDR, vec![REG_DATA], data)];
        let mut sensor = Bmi160::new(I2cMock::new(&expectations), ADDR);

        let sample = sensor.read_motion().unwrap();
        assert_eq!(sample.gyro, [16, -16, 256]);
        assert_eq!(sample.accel, [0, 32767, 16384]);
        sensor.release().done();
    }
}
