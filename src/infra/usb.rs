//! The USB host port: a CDC-ACM serial device.
//!
//! The USB stack runs as its own task; the service loop on the other
//! core exchanges bytes with it through a pair of channels.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use defmt::{debug, error, info, trace, warn};
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::{ConstStaticCell, StaticCell};

use crate::constants::{
    USB_MANUFACTURER, USB_MAX_PACKET_SIZE_0, USB_POWER_MA, USB_PRODUCT, USB_PRODUCT_ID,
    USB_VENDOR_ID,
};
use crate::host::HostPort;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

const MAX_PACKET: usize = 64;

// Bytes in flight between the USB tasks (core 0) and the service loop
// (core 1).
static HOST_RX: Channel<CriticalSectionRawMutex, u8, 256> = Channel::new();
static HOST_TX: Channel<CriticalSectionRawMutex, u8, 256> = Channel::new();

// Descriptor and state storage handed to the USB builder.
static CONFIG_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static BOS_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static MSOS_DESC: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static CONTROL_BUF: ConstStaticCell<[u8; 256]> = ConstStaticCell::new([0; 256]);
static CDC_STATE: StaticCell<State> = StaticCell::new();

/// Builds the USB device and its serial class.
pub struct UsbStack;

impl UsbStack {
    pub fn create(
        p_usb: USB,
    ) -> (
        UsbDevice<'static, Driver<'static, USB>>,
        CdcAcmClass<'static, Driver<'static, USB>>,
    ) {
        let driver = Driver::new(p_usb, Irqs);

        let mut config = Config::new(USB_VENDOR_ID, USB_PRODUCT_ID);
        config.manufacturer = Some(USB_MANUFACTURER);
        config.product = Some(USB_PRODUCT);
        config.max_power = USB_POWER_MA;
        config.max_packet_size_0 = USB_MAX_PACKET_SIZE_0;

        let mut builder = Builder::new(
            driver,
            config,
            CONFIG_DESC.take(),
            BOS_DESC.take(),
            MSOS_DESC.take(),
            CONTROL_BUF.take(),
        );

        let state = CDC_STATE.init(State::new());
        let class = CdcAcmClass::new(&mut builder, state, MAX_PACKET as u16);
        let usb = builder.build();

        (usb, class)
    }
}

#[embassy_executor::task]
pub async fn usb_task(mut usb: UsbDevice<'static, Driver<'static, USB>>) -> ! {
    usb.run().await
}

/// Pumps bytes between the CDC-ACM endpoints and the host channels.
#[embassy_executor::task]
pub async fn usb_io_task(class: CdcAcmClass<'static, Driver<'static, USB>>) -> ! {
    let (mut tx, mut rx) = class.split();

    let reader = async {
        loop {
            rx.wait_connection().await;
            info!("host connected");
            let mut buf = [0u8; MAX_PACKET];
            loop {
                match rx.read_packet(&mut buf).await {
                    Ok(n) => {
                        for &b in &buf[..n] {
                            if HOST_RX.try_send(b).is_err() {
                                warn!("host RX overflow, byte dropped");
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
            info!("host disconnected");
        }
    };

    let writer = async {
        let mut buf = [0u8; MAX_PACKET];
        loop {
            buf[0] = HOST_TX.receive().await;
            let mut n = 1;
            while n < buf.len() {
                match HOST_TX.try_receive() {
                    Ok(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    Err(_) => break,
                }
            }
            let _ = tx.write_packet(&buf[..n]).await;
        }
    };

    embassy_futures::join::join(reader, writer).await;
    unreachable!()
}

/// The service loop's view of the host link.
pub struct ChannelHostPort;

impl HostPort for ChannelHostPort {
    fn poll_byte(&mut self) -> Option<u8> {
        HOST_RX.try_receive().ok()
    }

    fn write_all(&mut self, bytes: &[u8]) {
        for &b in bytes {
            // The USB writer on the other core drains this; spin until
            // there is room.
            while HOST_TX.try_send(b).is_err() {
                core::hint::spin_loop();
            }
        }
    }
}
