//! Full status query against a live driver

use avr_core::{DeviceDriver, DriverError, Status};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Query every status field, in a fixed order, each bounded by `limit`
///
/// The first failing field aborts the query.
pub async fn query_status(driver: &dyn DeviceDriver, limit: Duration) -> Result<Status, DriverError> {
    let on = bounded("power", limit, driver.is_on()).await?;
    let volume = bounded("volume", limit, driver.volume()).await?;
    let mute = bounded("mute", limit, driver.mute()).await?;
    let source = bounded("source", limit, driver.source()).await?;
    let sound_mode = bounded("sound mode", limit, driver.sound_mode()).await?;

    Ok(Status {
        on,
        volume,
        mute,
        source,
        sound_mode,
    })
}

async fn bounded<T>(
    command: &str,
    limit: Duration,
    query: impl Future<Output = Result<T, DriverError>>,
) -> Result<T, DriverError> {
    match timeout(limit, query).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            command: command.to_string(),
            timeout: limit,
        }),
    }
}
