use crate::vehicle::VehicleID;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The synchronous arrival callback failed. The failure propagates as
    /// fatal and the tick is considered incomplete; nothing is retried.
    #[error("arrival callback failed for vehicle {} at {stop}: {source}", vehicle.0)]
    Callback {
        vehicle: VehicleID,
        stop: String,
        #[source]
        source: anyhow::Error,
    },
}
