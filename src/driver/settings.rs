use std::time::Duration;

const DEFAULT_NAME: &str = "slotring";
const DEFAULT_SIZE: usize = 1024;
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub(super) name: String,
    pub(super) size: usize,
    pub(super) delay: Duration,
    pub(super) retry_collisions: bool,
}

impl DriverSettings {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct DriverSettingsBuilder {
    name: Option<String>,
    size: Option<usize>,
    delay: Option<Duration>,
    retry_collisions: Option<bool>,
}

impl DriverSettingsBuilder {
    pub fn new() -> Self {
        DriverSettingsBuilder::default()
    }

    /// Set the name of the ring buffer, shared by the producer and the
    /// consumer.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the size of the data region in bytes. Only used by the producer.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the delay between two operations.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Keep running when the buffer is full (producer) or empty (consumer)
    /// instead of exiting with an error.
    pub fn retry_collisions(mut self, retry: bool) -> Self {
        self.retry_collisions = Some(retry);
        self
    }

    pub fn build(self) -> DriverSettings {
        let name = self.name.unwrap_or_else(|| DEFAULT_NAME.to_string());

        let size = self.size.unwrap_or(DEFAULT_SIZE);

        let delay = self.delay.unwrap_or(DEFAULT_DELAY);

        let retry_collisions = self.retry_collisions.unwrap_or(false);

        DriverSettings {
            name,
            size,
            delay,
            retry_collisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DriverSettingsBuilder;
    use crate::driver::settings::DEFAULT_DELAY;
    use crate::driver::settings::DEFAULT_NAME;
    use crate::driver::settings::DEFAULT_SIZE;

    #[test]
    fn test_default_settings() {
        let settings = DriverSettingsBuilder::new().build();

        assert_eq!(settings.name, DEFAULT_NAME);
        assert_eq!(settings.size, DEFAULT_SIZE);
        assert_eq!(settings.delay, DEFAULT_DELAY);
        assert!(!settings.retry_collisions);
    }

    #[test]
    fn test_settings() {
        let settings = DriverSettingsBuilder::new()
            .name("quotes")
            .size(100)
            .delay(Duration::from_millis(10))
            .retry_collisions(true)
            .build();

        assert_eq!(settings.name(), "quotes");
        assert_eq!(settings.size, 100);
        assert_eq!(settings.delay, Duration::from_millis(10));
        assert!(settings.retry_collisions);
    }
}
