//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements     | Connects to                   |
//! |----------------|----------------|-------------------------------|
//! | `display`      | DisplayPort    | Status screen (log-rendered)  |
//! | `event_stream` | EventSink      | `/events` server-sent events  |
//! | `flash`        | StoragePort    | SPIFFS web pages and presets  |
//! | `http`         | (routes)       | EspHttpServer routes → `api`  |
//! | `log_sink`     | EventSink      | Serial log output             |
//! | `rtc_memory`   | SequenceStore  | RTC slow memory counter       |
//! | `sd_card`      | StoragePort    | FAT filesystem on the SD card |
//! | `time`         | ClockPort      | SNTP-synced system time       |

pub mod display;
pub mod event_stream;
pub mod flash;
#[cfg(target_os = "espidf")]
pub mod http;
pub mod log_sink;
pub mod rtc_memory;
pub mod sd_card;
pub mod time;
