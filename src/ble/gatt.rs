//! GATT server: HID over GATT keyboard plus a battery service.
//!
//! The HID service carries both input paths a host may pick:
//!
//! | characteristic         | UUID   | used in            |
//! |------------------------|--------|--------------------|
//! | Report (input)         | 0x2A4D | report protocol    |
//! | Boot Keyboard Input    | 0x2A22 | boot protocol      |
//! | Protocol Mode          | 0x2A4E | selects the above  |
//!
//! A write to Protocol Mode surfaces as [`ServerEvent::ProtocolMode`].

use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, NotifyValueError, RegisterError, WriteOp};
use nrf_softdevice::ble::{Connection, SecurityMode, Uuid};
use nrf_softdevice::Softdevice;

use crate::ble::ReportProtocol;
use crate::error::RadioError;
use crate::fmt::debug;
use crate::hid::{HID_INFORMATION, KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};

const HID_SERVICE: Uuid = Uuid::new_16(0x1812);
const HID_INFO: Uuid = Uuid::new_16(0x2a4a);
const REPORT_MAP: Uuid = Uuid::new_16(0x2a4b);
const HID_CONTROL_POINT: Uuid = Uuid::new_16(0x2a4c);
const HID_REPORT: Uuid = Uuid::new_16(0x2a4d);
const PROTOCOL_MODE: Uuid = Uuid::new_16(0x2a4e);
const BOOT_KEYBOARD_INPUT: Uuid = Uuid::new_16(0x2a22);
const REPORT_REFERENCE: Uuid = Uuid::new_16(0x2908);

/// Protocol Mode values (HIDS 1.0, 3.4).
const PROTOCOL_MODE_BOOT: u8 = 0x00;
const PROTOCOL_MODE_REPORT: u8 = 0x01;

/// Report ID 0, input report.
const INPUT_REPORT_REFERENCE: [u8; 2] = [0x00, 0x01];

#[nrf_softdevice::gatt_service(uuid = "180f")]
pub struct BatteryService {
    #[characteristic(uuid = "2a19", security = "justworks", read, notify)]
    pub battery_level: u8,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HidService {
    protocol_mode: u16,
    report_input: u16,
    boot_input: u16,
}

impl HidService {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, HID_SERVICE)?;

        service
            .add_characteristic(
                HID_INFO,
                Attribute::new(HID_INFORMATION).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        service
            .add_characteristic(
                REPORT_MAP,
                Attribute::new(KEYBOARD_REPORT_DESCRIPTOR).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        service
            .add_characteristic(
                HID_CONTROL_POINT,
                Attribute::new([0u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().write_without_response()),
            )?
            .build();

        let protocol_mode = service
            .add_characteristic(
                PROTOCOL_MODE,
                Attribute::new([PROTOCOL_MODE_REPORT]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().write_without_response()),
            )?
            .build();

        let mut report_input = service.add_characteristic(
            HID_REPORT,
            Attribute::new([0u8; KEYBOARD_REPORT_SIZE]).security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().notify()),
        )?;
        report_input.add_descriptor(
            REPORT_REFERENCE,
            Attribute::new(INPUT_REPORT_REFERENCE).security(SecurityMode::JustWorks),
        )?;
        let report_input = report_input.build();

        let boot_input = service
            .add_characteristic(
                BOOT_KEYBOARD_INPUT,
                Attribute::new([0u8; KEYBOARD_REPORT_SIZE]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().notify()),
            )?
            .build();

        let _service = service.build();

        Ok(Self {
            protocol_mode: protocol_mode.value_handle,
            report_input: report_input.value_handle,
            boot_input: boot_input.value_handle,
        })
    }

    /// Notify `report` on the input characteristic for `protocol`.
    pub fn send(
        &self,
        conn: &Connection,
        protocol: ReportProtocol,
        report: &[u8],
    ) -> Result<(), RadioError> {
        let handle = match protocol {
            ReportProtocol::Boot => self.boot_input,
            ReportProtocol::Report => self.report_input,
        };
        gatt_server::notify_value(conn, handle, report).map_err(|e| match e {
            NotifyValueError::Disconnected => RadioError::Notify,
            NotifyValueError::Raw(code) => RadioError::Raw(code as u32),
        })
    }

    fn on_write(&self, handle: u16, data: &[u8]) -> Option<ServerEvent> {
        if handle != self.protocol_mode {
            return None;
        }
        match data.first().copied() {
            Some(PROTOCOL_MODE_BOOT) => Some(ServerEvent::ProtocolMode(ReportProtocol::Boot)),
            Some(PROTOCOL_MODE_REPORT) => Some(ServerEvent::ProtocolMode(ReportProtocol::Report)),
            _ => {
                debug!("Ignoring protocol mode write {:?}", data);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServerEvent {
    ProtocolMode(ReportProtocol),
}

pub struct KeyboardServer {
    pub bas: BatteryService,
    pub hid: HidService,
}

impl KeyboardServer {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let bas = BatteryService::new(sd)?;
        let hid = HidService::new(sd)?;
        Ok(Self { bas, hid })
    }
}

impl gatt_server::Server for KeyboardServer {
    type Event = ServerEvent;

    fn on_write(
        &self,
        _conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        self.bas.on_write(handle, data);
        self.hid.on_write(handle, data)
    }
}
