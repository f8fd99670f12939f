use embassy_net::Stack;
use embassy_time::{Duration, with_timeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};

use crate::error::Error;
use crate::traits::Radio;

const DHCP_TIMEOUT_SECS: u64 = 20;

/// Station-mode Wi-Fi plus the network stack riding on it.
pub struct WifiRadio<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    ssid: &'a str,
    password: &'a str,
}

impl<'a> WifiRadio<'a> {
    pub fn new(
        controller: WifiController<'a>,
        stack: Stack<'a>,
        ssid: &'a str,
        password: &'a str,
    ) -> Self {
        Self {
            controller,
            stack,
            ssid,
            password,
        }
    }
}

impl Radio for WifiRadio<'_> {
    async fn join(&mut self) -> Result<(), Error> {
        if !matches!(self.controller.is_started(), Ok(true)) {
            let config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(self.ssid.into())
                    .with_password(self.password.into()),
            );
            self.controller
                .set_config(&config)
                .map_err(|_| Error::Connection("WiFi configuration rejected"))?;
            esp_println::println!("[WIFI] Starting radio");
            self.controller
                .start_async()
                .await
                .map_err(|_| Error::Connection("WiFi failed to start"))?;
        }

        esp_println::println!("[WIFI] Connecting to {}", self.ssid);
        self.controller
            .connect_async()
            .await
            .map_err(|_| Error::Connection("WiFi association failed"))?;

        with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS), self.stack.wait_config_up())
            .await
            .map_err(|_| Error::Connection("DHCP timeout"))?;

        if let Some(config) = self.stack.config_v4() {
            esp_println::println!("[WIFI] Got IP {}", config.address);
        }
        Ok(())
    }

    async fn reset(&mut self) {
        esp_println::println!("[WIFI] Resetting radio");
        if let Err(e) = self.controller.disconnect_async().await {
            log::debug!("Disconnect error (may already be disconnected): {:?}", e);
        }
        if let Err(e) = self.controller.stop_async().await {
            log::debug!("Stop error: {:?}", e);
        }
    }

    fn is_connected(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true))
            && self.stack.is_link_up()
            && self.stack.config_v4().is_some()
    }
}
