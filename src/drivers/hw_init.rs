//! One-shot hardware peripheral initialization.
//!
//! Configures the pressure ADC channel and mounts the SPIFFS asset
//! partition using raw ESP-IDF sys calls.  Called once from `main()`
//! before the tick loop starts.  The SD card is mounted by `main()`
//! through the esp-idf-svc FAT driver.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// VFS mount point of the SD card's FAT filesystem.
pub const SD_MOUNT_POINT: &str = "/sdcard";

/// VFS mount point of the SPIFFS partition (web pages, preset tables).
pub const FLASH_MOUNT_POINT: &str = "/spiffs";

/// ADC1 channel wired to the pressure transducer (GPIO 36).
pub const ADC1_CH_PRESSURE: u32 = 0;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    FlashMountFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::FlashMountFailed(rc) => write!(f, "SPIFFS mount failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the tick loop; single-threaded.
    unsafe {
        init_adc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── SPIFFS ────────────────────────────────────────────────────

/// Register the default SPIFFS partition at [`FLASH_MOUNT_POINT`].  The
/// partition is never formatted here; a blank one stays unmounted.
#[cfg(target_os = "espidf")]
pub fn mount_flash() -> Result<(), HwInitError> {
    let conf = esp_vfs_spiffs_conf_t {
        base_path: c"/spiffs".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: false,
    };
    // SAFETY: `conf` and the path literal outlive the call; the VFS copies
    // the base path during registration.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::FlashMountFailed(ret));
    }
    info!("hw_init: SPIFFS mounted at {}", FLASH_MOUNT_POINT);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn mount_flash() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): flash mount skipped");
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: Must be called only from the single-threaded init path or the
/// tick-loop ADC read path.  No concurrent access is possible because
/// `init_adc()` completes before the loop starts.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) };
    if ret != ESP_OK as i32 { return Err(HwInitError::AdcInitFailed(ret)); }

    // 12 dB (formerly 11 dB) covers the transducer's 0.8–3.1 V window.
    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };

    let ret = unsafe { adc_oneshot_config_channel(adc1_handle(), ADC1_CH_PRESSURE, &chan_cfg) };
    if ret != ESP_OK as i32 { return Err(HwInitError::AdcInitFailed(ret)); }

    info!("hw_init: ADC1 configured (CH0=pressure, GPIO {})", crate::pins::PRESSURE_ADC_GPIO);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: adc1_handle() contract, single-threaded tick-loop access only.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    if ret != ESP_OK as i32 {
        return 0;
    }
    raw.max(0) as u16
}

#[cfg(not(target_os = "espidf"))]
pub fn adc1_read(_channel: u32) -> u16 {
    0
}
