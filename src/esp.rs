//! ESP-IDF implementations of the radio and clock.

use anyhow::{anyhow, bail, Result};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::{delay::FreeRtos, modem::Modem};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition, wifi::EspWifi};
use esp_idf_sys as sys;
use log::*;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::radio::{AssociationStatus, Clock, Radio};

/// Negative status checks before the connect request is reissued. The driver
/// gives up after a failed attempt, so without this a node that booted while
/// the AP was down would wait forever.
const RECONNECT_AFTER_POLLS: u32 = 10;

/// Station-mode Wi-Fi driver.
pub struct EspRadio {
    wifi: EspWifi<'static>,
    polls_since_connect: u32,
}

impl EspRadio {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self> {
        let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
        Ok(Self {
            wifi,
            polls_since_connect: 0,
        })
    }

    fn is_up(&self) -> Result<bool> {
        Ok(self.wifi.is_connected()? && self.wifi.sta_netif().is_up()?)
    }
}

impl Radio for EspRadio {
    fn begin_association(&mut self, network_name: &str, credential: &str) -> Result<()> {
        let mut ssid = heapless::String::<32>::new();
        ssid.push_str(network_name)
            .map_err(|_| anyhow!("SSID too long: {}", network_name))?;

        let mut password = heapless::String::<64>::new();
        password
            .push_str(credential)
            .map_err(|_| anyhow!("Wi-Fi password too long"))?;

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid,
                password,
                auth_method: AuthMethod::WPA2Personal,
                ..Default::default()
            }))?;

        if !self.wifi.is_started()? {
            info!("Starting Wi-Fi station mode...");
            self.wifi.start()?;
        }

        self.polls_since_connect = 0;
        self.wifi.connect()?;
        Ok(())
    }

    fn association_status(&mut self) -> AssociationStatus {
        match self.is_up() {
            Ok(true) => return AssociationStatus::Connected,
            Ok(false) => {}
            Err(e) => debug!("Wi-Fi status query failed: {:?}", e),
        }

        self.polls_since_connect += 1;
        if self.polls_since_connect >= RECONNECT_AFTER_POLLS {
            self.polls_since_connect = 0;
            if let Err(e) = self.wifi.connect() {
                debug!("Wi-Fi reconnect request failed: {:?}", e);
            }
        }
        AssociationStatus::NotConnected
    }

    fn signal_strength(&mut self) -> Result<i32> {
        // SAFETY: all-zero is a valid bit pattern for this plain C record, and
        // the driver only writes into it.
        let mut ap_info: sys::wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let err = unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        if err != sys::ESP_OK {
            bail!("esp_wifi_sta_get_ap_info failed with error code: {}", err);
        }
        Ok(ap_info.rssi as i32)
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        match self.wifi.sta_netif().get_ip_info() {
            Ok(ip_info) => Some(Ipv4Addr::from(ip_info.ip.octets())),
            Err(e) => {
                warn!("Failed to read IP info: {:?}", e);
                None
            }
        }
    }
}

/// Clock backed by FreeRTOS task delays.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreeRtosClock;

impl Clock for FreeRtosClock {
    fn sleep(&mut self, period: Duration) {
        FreeRtos::delay_ms(u32::try_from(period.as_millis()).unwrap_or(u32::MAX));
    }
}

/// Station MAC of this chip, for the boot log.
pub fn mac_address() -> [u8; 6] {
    let mut mac = [0u8; 6];
    unsafe {
        sys::esp_wifi_get_mac(sys::wifi_interface_t_WIFI_IF_STA, mac.as_mut_ptr());
    }
    mac
}
