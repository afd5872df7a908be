//! Connectable advertising and per-connection tasks.
//!
//! The consumer asks for a session with [`request`]; [`advertiser_task`]
//! runs one connectable, scannable undirected session per `Start` and ends
//! it on `Stop` or when a central connects. [`ADVERTISING`] is true from
//! the request until the session ends, which is what the consumer's
//! `Radio::is_advertising` reads.
//!
//! Each accepted connection gets a [`connection_task`] that registers the
//! peer, serves GATT until the link drops, and unregisters it.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::advertisement_builder::{
    AdvertisementDataType, Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload,
    ServiceList, ServiceUuid16,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::Softdevice;

use crate::ble::gatt::{KeyboardServer, ServerEvent};
use crate::ble::security::Bonder;
use crate::ble::{Callbacks, PeerId, StackEvent};
use crate::config::{ADV_INTERVAL, APPEARANCE_KEYBOARD, DEVICE_NAME, MAX_CONNECTIONS};
use crate::error::RadioError;
use crate::fmt::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvCommand {
    Start,
    Stop,
}

/// True while a session is requested or running.
pub static ADVERTISING: AtomicBool = AtomicBool::new(false);

static ADV_CONTROL: Signal<CriticalSectionRawMutex, AdvCommand> = Signal::new();

const APPEARANCE: [u8; 2] = APPEARANCE_KEYBOARD.to_le_bytes();

/// Flags, service list and keyboard appearance.
static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
    .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
    .services_16(
        ServiceList::Complete,
        &[ServiceUuid16::HUMAN_INTERFACE_DEVICE, ServiceUuid16::BATTERY],
    )
    .raw(AdvertisementDataType::APPEARANCE, &APPEARANCE)
    .build();

static SCAN_DATA: LegacyAdvertisementPayload =
    LegacyAdvertisementBuilder::new().full_name(DEVICE_NAME).build();

pub fn request(command: AdvCommand) {
    ADVERTISING.store(command == AdvCommand::Start, Ordering::Release);
    ADV_CONTROL.signal(command);
}

async fn wait_for_stop() {
    while ADV_CONTROL.wait().await != AdvCommand::Stop {}
}

#[embassy_executor::task]
pub async fn advertiser_task(
    spawner: Spawner,
    sd: &'static Softdevice,
    server: &'static KeyboardServer,
    bonder: &'static Bonder,
    callbacks: &'static Callbacks<'static>,
) -> ! {
    let mut config = peripheral::Config::default();
    config.interval = ADV_INTERVAL;

    loop {
        if ADV_CONTROL.wait().await != AdvCommand::Start {
            ADVERTISING.store(false, Ordering::Release);
            continue;
        }

        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADV_DATA,
            scan_data: &SCAN_DATA,
        };
        let session = peripheral::advertise_pairable(sd, adv, &config, bonder);

        match select(session, wait_for_stop()).await {
            Either::First(Ok(conn)) => {
                ADVERTISING.store(false, Ordering::Release);
                debug!("Advertising ended by connection");
                if let Err(e) = spawner.spawn(connection_task(conn, server, bonder, callbacks)) {
                    warn!("No task for new connection: {:?}", e);
                }
            }
            Either::First(Err(e)) => {
                ADVERTISING.store(false, Ordering::Release);
                error!("Advertising error: {:?}", e);
            }
            Either::Second(()) => {
                ADVERTISING.store(false, Ordering::Release);
            }
        }
    }
}

#[embassy_executor::task(pool_size = MAX_CONNECTIONS)]
async fn connection_task(
    conn: Connection,
    server: &'static KeyboardServer,
    bonder: &'static Bonder,
    callbacks: &'static Callbacks<'static>,
) {
    let Some(handle) = conn.handle() else {
        return;
    };
    let peer = PeerId(handle);
    bonder.set_pairing_peer(peer);
    callbacks.dispatch(StackEvent::Connected(peer));

    if let Err(e) = conn.request_security() {
        warn!("{}: {:?}", RadioError::Security, e);
    }

    let _ = gatt_server::run(&conn, server, |event| match event {
        ServerEvent::ProtocolMode(protocol) => {
            callbacks.dispatch(StackEvent::ProtocolMode { peer, protocol })
        }
    })
    .await;

    info!("GATT server for {:?} finished", peer);
    bonder.clear_pairing_peer(peer);
    // The SoftDevice wrapper does not surface the HCI reason.
    callbacks.dispatch(StackEvent::Disconnected { peer, reason: 0 });
}
