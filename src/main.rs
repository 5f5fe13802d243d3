#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::info;
    use rssi_beacon::esp::{mac_address, EspRadio, FreeRtosClock};
    use rssi_beacon::{Beacon, JoinController, NodeConfig};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("=== ESP32 RSSI Beacon ===");

    let config = NodeConfig::from_build_env()?;
    info!("Config: {:?}", config);

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut radio = EspRadio::new(peripherals.modem, sys_loop, nvs)?;
    let mut clock = FreeRtosClock;

    let mac = mac_address();
    info!(
        "Device MAC: {:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );

    JoinController::new(&config).join(&mut radio, &mut clock);

    let beacon = Beacon::bind(&config)?;
    beacon.run(&mut radio, &mut clock)
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!(
        "rssi-beacon drives the ESP32 radio and only runs on an ESP-IDF target; \
         use rssi-collector on the host"
    )
}
