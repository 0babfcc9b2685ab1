//! The polling loops behind the `slotring` tool: a producer that keeps
//! writing records and a consumer that keeps reading them, one operation per
//! `delay`, until a shutdown signal arrives.

pub mod settings;

use std::future::Future;

use settings::DriverSettings;
use snafu::ResultExt;
use tokio::signal::unix::signal;
use tokio::signal::unix::Signal;
use tokio::signal::unix::SignalKind;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::error;
use crate::error::Result;
use crate::record::Record;
use crate::ringbuf::RingBuffer;

/// Creates the ring buffer and writes one record per `delay` until
/// `shutdown` completes, then destroys the buffer.
///
/// On any error the buffer is destroyed as well and the error is returned,
/// unless it is a collision and `retry_collisions` is set, in which case the
/// same record is written again after the next delay.
///
/// Returns the number of records written.
pub async fn run_producer<S, F>(
    settings: DriverSettings,
    shutdown: S,
    mut next_record: F,
) -> Result<u64>
where
    S: Future<Output = ()>,
    F: FnMut() -> Record,
{
    let DriverSettings {
        name,
        size,
        delay,
        retry_collisions,
    } = settings;

    let mut buffer = RingBuffer::create(&name, size)?;
    tokio::pin!(shutdown);

    let mut written = 0;
    let mut pending: Option<Record> = None;

    loop {
        let record = pending.take().unwrap_or_else(&mut next_record);

        match buffer.put(&record) {
            Ok(()) => {
                written += 1;
                info!(
                    "reader: {}, writer: {}",
                    buffer.reader_pos(),
                    buffer.writer_pos()
                );
            }
            Err(e) if retry_collisions && e.is_collision() => {
                debug!("ring buffer {} is full, retry later: {}", name, e);
                pending = Some(record);
            }
            Err(e) => {
                error!(
                    "error {}, destroying ring buffer {} and exiting",
                    e, name
                );
                if let Err(destroy_err) = buffer.destroy() {
                    error!(
                        "failed to destroy ring buffer {}: {}",
                        name, destroy_err
                    );
                }
                return Err(e);
            }
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("shutting down producer, destroying ring buffer {}", name);
    buffer.destroy()?;

    Ok(written)
}

/// Attaches to the ring buffer and reads one record per `delay` until
/// `shutdown` completes, then closes the buffer. Each record is handed to
/// `on_record`.
///
/// Errors are handled as in [run_producer], except that the buffer is only
/// closed, never destroyed.
///
/// Returns the number of records read.
pub async fn run_consumer<S, F>(
    settings: DriverSettings,
    shutdown: S,
    mut on_record: F,
) -> Result<u64>
where
    S: Future<Output = ()>,
    F: FnMut(Record),
{
    let DriverSettings {
        name,
        delay,
        retry_collisions,
        ..
    } = settings;

    let mut buffer = RingBuffer::attach(&name)?;
    tokio::pin!(shutdown);

    let mut read = 0;

    loop {
        match buffer.get() {
            Ok(record) => {
                read += 1;
                on_record(record);
                info!(
                    "reader: {}, writer: {}",
                    buffer.reader_pos(),
                    buffer.writer_pos()
                );
            }
            Err(e) if retry_collisions && e.is_collision() => {
                debug!("ring buffer {} is empty, retry later: {}", name, e);
            }
            Err(e) => {
                error!("error {}, closing ring buffer {} and exiting", e, name);
                buffer.close();
                return Err(e);
            }
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("shutting down consumer, closing ring buffer {}", name);
    buffer.close();

    Ok(read)
}

/// SIGINT and SIGTERM, installed up front so that a signal arriving before
/// the loop starts is not lost.
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    pub fn install() -> Result<Self> {
        let interrupt =
            signal(SignalKind::interrupt()).context(error::IoSnafu)?;
        let terminate =
            signal(SignalKind::terminate()).context(error::IoSnafu)?;

        Ok(ShutdownSignal {
            interrupt,
            terminate,
        })
    }

    /// Completes when either signal is received.
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {
                info!("received SIGINT, attempting graceful shutdown")
            }
            _ = self.terminate.recv() => {
                info!("received SIGTERM, attempting graceful shutdown")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::settings::DriverSettingsBuilder;
    use super::*;
    use crate::error::Error;
    use crate::record::DATA_BLOCK_SIZE;

    fn unique_name() -> String {
        format!("driver-test-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_consumer_without_producer() {
        let settings = DriverSettingsBuilder::new().name(unique_name()).build();

        let result =
            run_consumer(settings, std::future::pending(), |_| {}).await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_producer_fails_when_full() {
        let name = unique_name();
        let settings = DriverSettingsBuilder::new()
            .name(name.clone())
            .size(32)
            .delay(Duration::from_millis(1))
            .build();

        let result = run_producer(settings, std::future::pending(), || {
            [1; DATA_BLOCK_SIZE]
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reader cursor at 0. Writer cursor attemping to write [0:16]"
        );

        // The buffer was destroyed on the way out.
        assert!(matches!(
            RingBuffer::attach(&name),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_producer_destroys_on_shutdown() {
        let name = unique_name();
        let settings = DriverSettingsBuilder::new()
            .name(name.clone())
            .size(100)
            .delay(Duration::from_secs(100))
            .build();

        let written = run_producer(settings, async {}, || [1; DATA_BLOCK_SIZE])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert!(matches!(
            RingBuffer::attach(&name),
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_producer_and_consumer() {
        let name = unique_name();
        let msg_num: u8 = 20;

        let producer_settings = DriverSettingsBuilder::new()
            .name(name.clone())
            .size(16 * 1024)
            .delay(Duration::from_millis(1))
            .retry_collisions(true)
            .build();
        let consumer_settings = DriverSettingsBuilder::new()
            .name(name.clone())
            .delay(Duration::from_millis(1))
            .retry_collisions(true)
            .build();

        let (stop_producer, producer_stopped) = oneshot::channel::<()>();
        let (stop_consumer, consumer_stopped) = oneshot::channel::<()>();
        let (send_record, mut recv_record) =
            tokio::sync::mpsc::unbounded_channel();

        let mut next = 0u8;
        let producer = tokio::spawn(run_producer(
            producer_settings,
            async move {
                let _ = producer_stopped.await;
            },
            move || {
                next = next.wrapping_add(1);
                [next; DATA_BLOCK_SIZE]
            },
        ));

        // Let the producer create the buffer.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let consumer = tokio::spawn(run_consumer(
            consumer_settings,
            async move {
                let _ = consumer_stopped.await;
            },
            move |record| {
                let _ = send_record.send(record);
            },
        ));

        for i in 1..=msg_num {
            let record = recv_record.recv().await.unwrap();
            assert_eq!(record, [i; DATA_BLOCK_SIZE]);
        }

        stop_consumer.send(()).unwrap();
        let read = consumer.await.unwrap().unwrap();
        assert!(read >= msg_num as u64);

        stop_producer.send(()).unwrap();
        let written = producer.await.unwrap().unwrap();
        assert!(written >= read);

        assert!(matches!(
            RingBuffer::attach(&name),
            Err(Error::NotFound { .. })
        ));
    }
}
