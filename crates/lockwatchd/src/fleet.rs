//! Fan-out helpers for calling the device API across the fleet.
//!
//! Every call gets its own timeout and its own `Result`; one device's
//! failure never affects another's.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use lockwatch_core::{Device, DeviceApi, DeviceApiError, DeviceStatus};
use tracing::{error, warn};

/// Upper bound on concurrent device API calls within one cycle or batch.
pub const MAX_CONCURRENT_REQUESTS: usize = 8;

/// Returns the parallelism to use for `n` devices.
pub fn concurrency_for(n: usize) -> usize {
    n.clamp(1, MAX_CONCURRENT_REQUESTS)
}

/// Runs a device API call, mapping an elapsed timeout to `DeviceApiError::Timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, DeviceApiError>
where
    F: Future<Output = Result<T, DeviceApiError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(DeviceApiError::Timeout),
    }
}

/// Fetches the status of every given device concurrently.
///
/// Results come back in input order, one per device.
pub async fn fetch_statuses<'a, I>(
    devices: I,
    api: &dyn DeviceApi,
    timeout: Duration,
) -> Vec<(&'a Device, Result<DeviceStatus, DeviceApiError>)>
where
    I: IntoIterator<Item = &'a Device>,
    I::IntoIter: ExactSizeIterator + Send + 'a,
{
    let devices = devices.into_iter();
    let concurrency = concurrency_for(devices.len());
    stream::iter(devices)
        .map(move |device| async move { (device, with_timeout(timeout, api.get_status(device)).await) })
        .buffered(concurrency)
        .boxed()
        .collect()
        .await
}

/// Logs a failed status fetch at a level matching its severity.
pub fn log_fetch_error(device: &Device, err: &DeviceApiError) {
    if err.is_auth() {
        error!(
            device_id = %device.id,
            device = device.display_name(),
            error = %err,
            "Device API rejected credentials; treating device as unknown"
        );
    } else {
        warn!(
            device_id = %device.id,
            device = device.display_name(),
            error = %err,
            "Failed to fetch device status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_for() {
        assert_eq!(concurrency_for(0), 1);
        assert_eq!(concurrency_for(3), 3);
        assert_eq!(concurrency_for(100), MAX_CONCURRENT_REQUESTS);
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let ok: Result<u8, DeviceApiError> = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, DeviceApiError> =
            with_timeout(Duration::from_secs(1), async { Err(DeviceApiError::NotFound) }).await;
        assert_eq!(err, Err(DeviceApiError::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapsed() {
        let result: Result<(), DeviceApiError> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(DeviceApiError::Timeout));
    }
}
