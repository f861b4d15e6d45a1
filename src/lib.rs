//! pico488
//!
//! Firmware that turns a Raspberry Pi Pico into a bidirectional bridge
//! between a USB serial host link and an IEEE-488 (GPIB) instrument
//! bus.  Lines beginning with `++` configure and drive the interface;
//! everything else passes through to the bus verbatim.
//!
//! The protocol core is hardware-independent: the bus engine drives
//! the wires through the [`pins::GpibPins`] adapter and keeps time
//! through [`util::time::Ticker`].  The `rp2040` feature adds the
//! embassy-based board layer and the firmware binary; without it the
//! crate builds for the host, where the [`sim`] loopback stands in for
//! the wires.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![cfg_attr(not(test), no_std)]

mod commands;
pub mod config;
pub mod constants;
pub mod gpib;
pub mod host;
pub mod interpreter;
pub mod pins;
pub mod sim;
pub mod util;

#[cfg(feature = "rp2040")]
mod infra;

#[cfg(feature = "rp2040")]
pub use firmware::common_main;

#[cfg(feature = "rp2040")]
mod firmware {
    #[allow(unused_imports)]
    use defmt::{debug, error, info, trace, warn};
    use embassy_executor::{Executor, Spawner};
    use embassy_rp::gpio::Flex;
    use embassy_rp::multicore::{spawn_core1, Stack};
    use embassy_time::Timer;
    use static_cell::StaticCell;

    use crate::config;
    use crate::constants::{FWVER, SERVICE_LOOP_PAUSE};
    use crate::gpib::GpibBus;
    use crate::infra::gpio::RpGpibPins;
    use crate::infra::storage::FlashStore;
    use crate::infra::usb::{usb_io_task, usb_task, ChannelHostPort, UsbStack};
    use crate::infra::watchdog;
    use crate::interpreter::Interpreter;

    static mut CORE1_STACK: Stack<8192> = Stack::new();
    static EXECUTOR1: StaticCell<Executor> = StaticCell::new();

    /// Firmware entry point: bring up the board, then run USB on core 0
    /// and the bus service loop on core 1.
    pub async fn common_main(spawner: Spawner) -> ! {
        let p = embassy_rp::init(Default::default());
        info!("{}", FWVER);
        crate::infra::init_logging();

        // GPIO assignment is the wiring contract for the board: DIO1..8
        // on GP2..GP9, control lines on GP10..GP17 in mask-bit order
        // (IFC, NDAC, NRFD, DAV, EOI, REN, SRQ, ATN).
        let dio = [
            Flex::new(p.PIN_2),
            Flex::new(p.PIN_3),
            Flex::new(p.PIN_4),
            Flex::new(p.PIN_5),
            Flex::new(p.PIN_6),
            Flex::new(p.PIN_7),
            Flex::new(p.PIN_8),
            Flex::new(p.PIN_9),
        ];
        let ctrl = [
            Flex::new(p.PIN_10),
            Flex::new(p.PIN_11),
            Flex::new(p.PIN_12),
            Flex::new(p.PIN_13),
            Flex::new(p.PIN_14),
            Flex::new(p.PIN_15),
            Flex::new(p.PIN_16),
            Flex::new(p.PIN_17),
        ];

        let wd = watchdog::start(p.WATCHDOG);
        let pins = RpGpibPins::new(dio, ctrl, wd);

        let mut store = FlashStore::new(p.FLASH);
        let cfg = config::load(&mut store);
        let bus = GpibBus::new(pins, cfg);

        // The blocking bus loop gets core 1 to itself, so handshake
        // busy-waits never stall USB.
        spawn_core1(
            p.CORE1,
            unsafe { &mut *core::ptr::addr_of_mut!(CORE1_STACK) },
            move || {
                let executor1 = EXECUTOR1.init(Executor::new());
                executor1.run(|spawner| {
                    spawner.spawn(service_task(bus, store)).unwrap();
                });
            },
        );

        let (usb, class) = UsbStack::create(p.USB);
        spawner.spawn(usb_task(usb)).unwrap();
        spawner.spawn(usb_io_task(class)).unwrap();

        loop {
            trace!("core0 alive");
            Timer::after_secs(60).await;
        }
    }

    #[embassy_executor::task]
    async fn service_task(mut bus: GpibBus<RpGpibPins>, mut store: FlashStore) -> ! {
        info!("service loop starting in {} mode", if bus.is_controller() { "controller" } else { "device" });
        bus.begin();
        let mut itp = Interpreter::new();
        let mut host = ChannelHostPort;
        loop {
            itp.service(&mut bus, &mut host, &mut store);
            if bus.take_reset_request() {
                bus.pins.reboot();
            }
            Timer::after(SERVICE_LOOP_PAUSE).await;
        }
    }
}
