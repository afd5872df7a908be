//! smallkb firmware entry point.
//!
//! Boot order: LED off, settle, inputs, SoftDevice, bonds from flash,
//! GATT server, advertiser and timers, then the consumer loop takes over
//! the main task for good.

#![no_std]
#![no_main]

use core::mem;

use defmt::{error, info, unwrap, warn};
use embassy_executor::{SpawnToken, Spawner};
use embassy_nrf::gpio::Pin;
use embassy_nrf::interrupt::Priority;
use embassy_time::{Duration, Timer};
use nrf_softdevice::{raw, Config, Flash, Softdevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use smallkb::ble::advertiser::advertiser_task;
use smallkb::ble::gatt::KeyboardServer;
use smallkb::ble::radio::SoftdeviceRadio;
use smallkb::ble::security::{bond_task, Bonder, BONDS};
use smallkb::ble::{Callbacks, ConnectionTable};
use smallkb::config::{BOOT_SETTLE_MS, DEFAULT_KEYCODE, DEVICE_NAME, MAX_CONNECTIONS};
use smallkb::control::Controller;
use smallkb::error::{Error, InputKind};
use smallkb::event::{Event, Mailbox};
use smallkb::indicator::led::{led_task, LedIndicator};
use smallkb::input::buttons::{key_task, pairing_button_task};
use smallkb::storage::BondStore;
use smallkb::timers::{oneshot_task, SignalTimers, FAST_MODE_TIMER, PAIRING_TIMER};

static TABLE: ConnectionTable = ConnectionTable::new();
static MAILBOX: Mailbox = Mailbox::new();
static CALLBACKS: Callbacks<'static> = Callbacks::new(&TABLE, &MAILBOX);
static BONDER: Bonder = Bonder::new(&CALLBACKS);
static SERVER: StaticCell<KeyboardServer> = StaticCell::new();

fn softdevice_config() -> Config {
    Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: MAX_CONNECTIONS as u8,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 256 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        conn_gatts: Some(raw::ble_gatts_conn_cfg_t {
            hvn_tx_queue_size: 4,
        }),
        ..Default::default()
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// A missing input disables that input only; the rest keeps running.
fn spawn_input<S>(spawner: Spawner, token: SpawnToken<S>, kind: InputKind) {
    if spawner.spawn(token).is_err() {
        error!("{}", Error::InputUnavailable(kind));
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("smallkb starting");

    // The SoftDevice reserves priorities 0, 1 and 4.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);

    // LED task first so the LED is driven off from the start.
    spawn_input(spawner, led_task(p.P0_13.degrade(), &MAILBOX), InputKind::Indicator);

    Timer::after(Duration::from_millis(BOOT_SETTLE_MS)).await;
    let keycode = DEFAULT_KEYCODE;
    info!("Keycode: {:#x}", keycode);

    spawn_input(spawner, key_task(p.P0_11.degrade(), &MAILBOX), InputKind::Key);
    spawn_input(
        spawner,
        pairing_button_task(p.P0_12.degrade(), &MAILBOX),
        InputKind::PairingButton,
    );

    let sd = Softdevice::enable(&softdevice_config());
    let server = SERVER.init(unwrap!(KeyboardServer::new(sd)));
    let sd: &'static Softdevice = sd;
    spawner.must_spawn(softdevice_task(sd));

    let mut flash = Flash::take(sd);
    let mut bonds = BondStore::new();
    match bonds.load_from_flash(&mut flash).await {
        Ok(count) => info!("Bond storage ready, {} bond(s)", count),
        Err(e) => warn!("Bond storage unavailable: {}", e),
    }
    BONDS.lock(|b| *b.borrow_mut() = bonds);
    spawner.must_spawn(bond_task(flash));

    if let Err(e) = server.bas.battery_level_set(&100) {
        warn!("Battery level not set: {:?}", e);
    }
    let server: &'static KeyboardServer = server;

    spawner.must_spawn(advertiser_task(spawner, sd, server, &BONDER, &CALLBACKS));
    spawner.must_spawn(oneshot_task(&PAIRING_TIMER, Event::PairingTimeout, &MAILBOX));
    spawner.must_spawn(oneshot_task(&FAST_MODE_TIMER, Event::FastModeIdleTimeout, &MAILBOX));

    let mut controller = Controller::new(
        &TABLE,
        SoftdeviceRadio::new(server),
        SignalTimers,
        LedIndicator,
        keycode,
    );
    controller.recheck();
    controller.run(&MAILBOX).await
}
