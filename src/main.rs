//! Well Monitor Firmware: Main Entry Point
//!
//! Hexagonal architecture with a sampling loop kept in phase with the
//! wall-clock minute.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  PressureInput   SystemClock    SdCardStorage   LogEventSink   │
//! │  (AdcPort)       (ClockPort)    (StoragePort)   (EventSink)    │
//! │  LogDisplay      RtcSequenceStore  FlashAssets  PushEventSink  │
//! │  http (EspHttpServer routes, /events stream)                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Pressure pipeline · Zone scheduler · Daily logbook    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  StorageGate (one SD user at a time, busy callers back off)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::sd::{spi::SdSpiHostDriver, SdCardConfiguration, SdCardDriver};
use esp_idf_svc::hal::spi::{config::DriverConfig as SpiDriverConfig, SpiDriver};
use esp_idf_svc::io::vfs::MountedFatfs;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use wellmon::adapters::display::LogDisplay;
use wellmon::adapters::event_stream::{PushEventSink, SseHub};
use wellmon::adapters::flash::FlashAssets;
use wellmon::adapters::http::{self, Shared};
use wellmon::adapters::log_sink::LogEventSink;
use wellmon::adapters::rtc_memory::RtcSequenceStore;
use wellmon::adapters::sd_card::SdCardStorage;
use wellmon::adapters::time::SystemClock;
use wellmon::app::ports::DisplayPort;
use wellmon::app::service::AppService;
use wellmon::config::SystemConfig;
use wellmon::drivers::hw_init::{self, FLASH_MOUNT_POINT, SD_MOUNT_POINT};
use wellmon::gate::StorageGate;
use wellmon::pins;
use wellmon::sensors::PressureInput;

/// Network credentials are baked in at build time.
const WIFI_SSID: &str = match option_env!("WELLMON_WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASS: &str = match option_env!("WELLMON_WIFI_PASS") {
    Some(s) => s,
    None => "",
};

/// Files the FAT driver may hold open at once.
const MAX_OPEN_FILES: usize = 4;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Wellmon v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let mut display = LogDisplay::new();
    display.show_splash();

    // ── 1b. Initialise hardware peripherals ───────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Without the ADC every reading is 0 counts; keep serving the logs.
        log::error!("HAL init failed: {}, pressure will read as zero", e);
    }

    let config = SystemConfig::default();
    config.validate().map_err(|e| anyhow!("default config invalid: {}", e))?;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 2. SD card ────────────────────────────────────────────
    info!(
        "SD: SPI sck={} miso={} mosi={} cs={}",
        pins::SD_SCK_GPIO,
        pins::SD_MISO_GPIO,
        pins::SD_MOSI_GPIO,
        pins::SD_CS_GPIO
    );
    let spi = SpiDriver::new(
        peripherals.spi3,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        Some(peripherals.pins.gpio19),
        &SpiDriverConfig::default(),
    )?;
    let sd_host = SdSpiHostDriver::new(
        spi,
        Some(peripherals.pins.gpio5),
        AnyIOPin::none(),
        AnyIOPin::none(),
        AnyIOPin::none(),
        None,
    )?;
    // Mount failure is not fatal: storage reports "not mounted" and every
    // logging and settings operation degrades to a refusal.
    let _fatfs = match SdCardDriver::new_spi(sd_host, &SdCardConfiguration::new())
        .and_then(|card| Fatfs::new_sdcard(0, card))
        .and_then(|fs| MountedFatfs::mount(fs, SD_MOUNT_POINT, MAX_OPEN_FILES))
    {
        Ok(mounted) => {
            info!("SD: mounted at {}", SD_MOUNT_POINT);
            Some(mounted)
        }
        Err(e) => {
            warn!("SD: mount failed ({}), running without storage", e);
            None
        }
    };
    let gate = Arc::new(StorageGate::new(SdCardStorage::new(SD_MOUNT_POINT)));

    // Pages and preset tables; without them the JSON routes still work.
    let flash_mounted = match hw_init::mount_flash() {
        Ok(()) => true,
        Err(e) => {
            warn!("SPIFFS: {}, web pages unavailable", e);
            false
        }
    };
    let flash = Arc::new(Mutex::new(FlashAssets::new(FLASH_MOUNT_POINT, flash_mounted)));

    // ── 3. Wi-Fi + time ───────────────────────────────────────
    let (_wifi, address) = match connect_wifi(peripherals.modem, sysloop, nvs) {
        Ok((wifi, ip)) => (Some(wifi), ip),
        Err(e) => {
            warn!("WiFi: connect failed ({}), continuing offline", e);
            (None, String::from("offline"))
        }
    };
    let _sntp = EspSntp::new_default()?;
    info!("SNTP: started, readings are not logged until time is set");

    // ── 4. Application service ────────────────────────────────
    let chunk_bytes = usize::from(config.stream_chunk_bytes);
    let hub = SseHub::new();
    let mut sink = (LogEventSink::new(), PushEventSink::new(hub.clone()));
    let mut service = AppService::new(config, RtcSequenceStore::new());
    service.boot(gate.as_ref(), &mut sink);
    let app = Arc::new(Mutex::new(service));

    // ── 5. HTTP server ────────────────────────────────────────
    let shared = Shared {
        app: app.clone(),
        gate: gate.clone(),
        flash,
        chunk_bytes,
    };
    let _server = http::start(shared, &hub)?;
    info!("HTTP: listening on http://{}/", address);

    // ── 6. Sampling loop ──────────────────────────────────────
    let mut adc = PressureInput::new(pins::PRESSURE_ADC_GPIO);
    let clock = SystemClock::new();

    loop {
        let delay = {
            let mut app = app.lock().unwrap_or_else(PoisonError::into_inner);
            app.tick(&mut adc, &clock, gate.as_ref(), &mut sink);
            app.render(&mut display, &address);
            app.next_tick_delay(&clock)
        };
        std::thread::sleep(delay);
    }
}

/// Join the configured network in station mode and return the address
/// shown on the display.
fn connect_wifi(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<(BlockingWifi<EspWifi<'static>>, String)> {
    if WIFI_SSID.is_empty() {
        return Err(anyhow!("no SSID configured"));
    }
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID.try_into().map_err(|_| anyhow!("SSID too long"))?,
        password: WIFI_PASS.try_into().map_err(|_| anyhow!("password too long"))?,
        auth_method: if WIFI_PASS.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;

    let ip = wifi.wifi().sta_netif().get_ip_info()?.ip.to_string();
    info!("WiFi: connected, ip={}", ip);
    Ok((wifi, ip))
}
