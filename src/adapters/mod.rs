//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                        |
//! |-------------|---------------|------------------------------------|
//! | `net`       | NetworkPort   | lwIP / host TCP (`std::net`)       |
//! | `resolver`  | ResolverPort  | `getaddrinfo`                      |
//! | `timer`     | TimerPort     | ESP32 system timer / `Instant`     |
//! | `flash`     | FlashPort     | OTA partitions via `esp-ota`       |
//! | `platform`  | FotaPorts     | all of the above, one poll loop    |
//! | `log_sink`  | EventSink     | Serial log output                  |
//! | `nvs`       | ConfigPort    | NVS / in-memory store              |
//! | `device_id` |               | Factory MAC                        |
//! | `wifi`      |               | ESP-IDF WiFi STA                   |

pub mod device_id;
pub mod flash;
pub mod log_sink;
pub mod net;
pub mod nvs;
pub mod platform;
pub mod resolver;
pub mod timer;
pub mod wifi;
