//! Motion sensor sampling loop.
//!
//! Sensor reads are blocking bus transfers, so each one runs on the blocking
//! pool and the sensor is handed back when it completes.

use super::error::{LoopError, SensorError};
use super::event_collector::emit_or_cancel;
use crate::mapping::{RawEvent, EV_REL};
use crate::sink::SharedSink;
use crate::variant::MotionAxis;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One 6-axis reading, raw sensor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionSample {
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
}

impl MotionSample {
    pub fn axis(&self, axis: MotionAxis) -> i16 {
        match axis {
            MotionAxis::GyroX => self.gyro[0],
            MotionAxis::GyroY => self.gyro[1],
            MotionAxis::GyroZ => self.gyro[2],
            MotionAxis::AccelX => self.accel[0],
            MotionAxis::AccelY => self.accel[1],
            MotionAxis::AccelZ => self.accel[2],
        }
    }
}

pub trait MotionSensor: Send {
    fn read_motion(&mut self) -> Result<MotionSample, SensorError>;
}

/// Polls a sensor on a fixed period and writes the selected axes as
/// relative events.
pub struct MotionSampler<S> {
    sensor: S,
    axes: &'static [(MotionAxis, u16)],
    period: Duration,
}

impl<S: MotionSensor + 'static> MotionSampler<S> {
    pub fn new(sensor: S, axes: &'static [(MotionAxis, u16)], period: Duration) -> Self {
        Self {
            sensor,
            axes,
            period,
        }
    }

    fn events(axes: &[(MotionAxis, u16)], sample: &MotionSample) -> Vec<RawEvent> {
        axes.iter()
            .map(|(axis, code)| RawEvent::new(EV_REL, *code, i32::from(sample.axis(*axis))))
            .collect()
    }

    pub async fn run(self, sink: SharedSink, token: CancellationToken) -> Result<(), LoopError> {
        let Self {
            mut sensor,
            axes,
            period,
        } = self;
        info!(
            "Starting motion sampler ({} axes every {:?})",
            axes.len(),
            period
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut failures: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let (returned, read) = tokio::task::spawn_blocking(move || {
                let read = sensor.read_motion();
                (sensor, read)
            })
            .await?;
            sensor = returned;

            let sample = match read {
                Ok(sample) => sample,
                Err(e) => {
                    failures += 1;
                    warn!("Motion read failed ({} so far): {}", failures, e);
                    continue;
                }
            };
            debug!("Motion sample {:?}", sample);

            let events = Self::events(axes, &sample);
            emit_or_cancel(&sink, &events, &token, "Motion sampler").await?;
        }

        info!("Motion sampler cancelled");
        Ok(())
    }
}
