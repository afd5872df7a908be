//! [`Radio`] over the SoftDevice.
//!
//! Advertising goes through the advertiser task; parameter updates and
//! passkey replies are raw SoftDevice calls on the connection handle.

use core::ptr;
use core::sync::atomic::Ordering;

use nrf_softdevice::ble::Connection;
use nrf_softdevice::raw;

use crate::ble::advertiser::{self, AdvCommand, ADVERTISING};
use crate::ble::gatt::KeyboardServer;
use crate::ble::{PeerId, ReportProtocol};
use crate::config::ConnParams;
use crate::control::Radio;
use crate::error::RadioError;
use crate::fmt::debug;

pub struct SoftdeviceRadio {
    server: &'static KeyboardServer,
}

impl SoftdeviceRadio {
    pub fn new(server: &'static KeyboardServer) -> Self {
        Self { server }
    }
}

impl Radio for SoftdeviceRadio {
    fn start_advertising(&mut self) -> Result<(), RadioError> {
        if ADVERTISING.load(Ordering::Acquire) {
            return Err(RadioError::AlreadyAdvertising);
        }
        advertiser::request(AdvCommand::Start);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), RadioError> {
        advertiser::request(AdvCommand::Stop);
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        ADVERTISING.load(Ordering::Acquire)
    }

    fn update_conn_params(&mut self, peer: PeerId, params: &ConnParams) -> Result<(), RadioError> {
        let ret = unsafe {
            raw::sd_ble_gap_conn_param_update(
                peer.0,
                &raw::ble_gap_conn_params_t {
                    min_conn_interval: params.interval_min,
                    max_conn_interval: params.interval_max,
                    slave_latency: params.latency,
                    conn_sup_timeout: params.supervision_timeout,
                },
            )
        };
        debug!("Set conn params for {:?} result: {}", peer, ret);
        if ret == raw::NRF_SUCCESS {
            Ok(())
        } else {
            Err(RadioError::ParamUpdate)
        }
    }

    fn confirm_passkey(&mut self, peer: PeerId) -> Result<(), RadioError> {
        // A null key with the passkey type accepts a numeric comparison.
        let ret = unsafe {
            raw::sd_ble_gap_auth_key_reply(
                peer.0,
                raw::BLE_GAP_AUTH_KEY_TYPE_PASSKEY as u8,
                ptr::null(),
            )
        };
        if ret == raw::NRF_SUCCESS {
            Ok(())
        } else {
            Err(RadioError::Authorize)
        }
    }

    fn send_report(
        &mut self,
        peer: PeerId,
        protocol: ReportProtocol,
        report: &[u8],
    ) -> Result<(), RadioError> {
        let conn = Connection::from_handle(peer.0).ok_or(RadioError::Notify)?;
        self.server.hid.send(&conn, protocol, report)
    }
}
