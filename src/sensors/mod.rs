//! Sensor module - contract, registry and household sensor variants

mod traits;
mod sensor;
mod registry;
mod thermal;
mod environmental;
mod optical;
mod presence;
mod contact;

pub(crate) use traits::payload;
pub use traits::{Location, Payload, SensorError, SensorModel, SensorStatus};
pub use sensor::{Sensor, SensorInfo, LOW_BATTERY_LEVEL};
pub use registry::{InstanceRecord, SensorFactory, SensorRegistry, SensorSpec};
pub use thermal::*;
pub use environmental::*;
pub use optical::*;
pub use presence::*;
pub use contact::*;
