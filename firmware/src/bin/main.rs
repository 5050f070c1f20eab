#![no_std]
#![no_main]

use defmt::{debug, error, info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select3, Either3};
use embassy_rp::bind_interrupts;
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{UART1, USB};
use embassy_rp::uart::{BufferedUart, Config as UartConfig};
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig};
use rand_core::RngCore;
use static_cell::StaticCell;
use uart_to_procon::{
    configure_usb_hid, engine_config, product_id, product_name, ConsoleRequest, DeviceIdentity,
    Engine, FrameQueue, ReportChannel, ReportForwarder, ReportSink, SerialChunk, SerialReader,
    StatusChannel, StatusForwarder, StatusSink, UartStatusSink, UsbReportSink, UsbRequestReader,
    CONTROLLER_KIND, REPORT_QUEUE_DEPTH, VENDOR_ID,
};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::BufferedInterruptHandler<UART1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

type SerialChannel = Channel<CriticalSectionRawMutex, SerialChunk, 8>;
type RequestChannel = Channel<CriticalSectionRawMutex, ConsoleRequest, 4>;

/// Raw command bytes from the serial task to the control task.
static SERIAL_CHANNEL: StaticCell<SerialChannel> = StaticCell::new();
/// Console output reports from the request task to the control task.
static REQUEST_CHANNEL: StaticCell<RequestChannel> = StaticCell::new();
/// Input reports from the control task to the report task.
static REPORT_CHANNEL: StaticCell<ReportChannel> = StaticCell::new();
/// Status lines from the control task to the status task.
static STATUS_CHANNEL: StaticCell<StatusChannel> = StaticCell::new();

/// UART ring buffers.
static UART_TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static UART_RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID state.
static HID_STATE: StaticCell<State> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("UART-to-ProCon starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let serial_channel = SERIAL_CHANNEL.init(Channel::new());
    let request_channel = REQUEST_CHANNEL.init(Channel::new());
    let report_channel = REPORT_CHANNEL.init(Channel::new());
    let status_channel = STATUS_CHANNEL.init(Channel::new());

    // A fresh address and link key per boot
    let mut rng = RoscRng {};
    let mut tail = [0u8; 3];
    let mut link_key = [0u8; 16];
    rng.fill_bytes(&mut tail);
    rng.fill_bytes(&mut link_key);
    let identity = DeviceIdentity::new(tail, link_key);
    info!("device address {:x}", identity.mac);

    // --- UART Setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = 115_200;

    let uart = BufferedUart::new(
        p.UART1,
        Irqs,
        p.PIN_8, // TX
        p.PIN_9, // RX
        UART_TX_BUF.init([0; 256]),
        UART_RX_BUF.init([0; 256]),
        uart_config,
    );
    let (tx, rx) = uart.split();
    let serial_reader = SerialReader::new(rx);
    let status_sink = UartStatusSink::new(tx);

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(VENDOR_ID, product_id(CONTROLLER_KIND));
    usb_config.manufacturer = Some("Nintendo Co., Ltd.");
    usb_config.product = Some(product_name(CONTROLLER_KIND));
    usb_config.serial_number = Some("000000000001");
    usb_config.max_power = 500;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    // Configure HID class
    let hid_state = HID_STATE.init(State::new());
    let (request_reader, report_sink) = configure_usb_hid(&mut builder, hid_state);

    // Build the USB device
    let usb_device = builder.build();

    // LED for error indication (on-board LED on Pico)
    let led = Output::new(p.PIN_25, Level::Low);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(serial_task(serial_reader, serial_channel, led).unwrap());
    spawner.spawn(request_task(request_reader, request_channel).unwrap());
    spawner.spawn(report_task(report_sink, report_channel).unwrap());
    spawner.spawn(status_task(status_sink, status_channel).unwrap());
    spawner.spawn(
        control_task(identity, serial_channel, request_channel, report_channel, status_channel)
            .unwrap(),
    );

    info!("UART-to-ProCon initialized, waiting for the console...");
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Serial task - forwards raw command bytes to the control task.
#[embassy_executor::task]
async fn serial_task(
    mut reader: SerialReader,
    channel: &'static SerialChannel,
    mut led: Output<'static>,
) {
    loop {
        match reader.receive().await {
            Ok(chunk) => {
                if !chunk.is_empty() {
                    channel.send(chunk).await;
                }
            }
            Err(e) => {
                error!("Serial error: {:?}", e);
                // Toggle LED to indicate error
                led.toggle();
            }
        }
    }
}

/// Request task - forwards console output reports to the control task.
#[embassy_executor::task]
async fn request_task(mut reader: UsbRequestReader<'static>, channel: &'static RequestChannel) {
    loop {
        match reader.read().await {
            Ok(request) => channel.send(request).await,
            Err(e) => warn!("USB request error: {:?}", e),
        }
    }
}

/// Report task - writes queued reports to the IN endpoint.
#[embassy_executor::task]
async fn report_task(mut sink: UsbReportSink<'static>, channel: &'static ReportChannel) {
    sink.wait_ready().await;
    info!("USB HID ready");

    loop {
        let frame = channel.receive().await;
        if let Err(e) = sink.send(frame.as_bytes()).await {
            debug!("Report error: {:?}", e);
        }
    }
}

/// Status task - writes status lines to the UART.
#[embassy_executor::task]
async fn status_task(mut sink: UartStatusSink, channel: &'static StatusChannel) {
    loop {
        let line = channel.receive().await;
        if let Err(e) = sink.write_line(&line).await {
            error!("Status error: {:?}", e);
        }
    }
}

/// Control task - owns the engine and produces one report per tick.
#[embassy_executor::task]
async fn control_task(
    identity: DeviceIdentity,
    serial: &'static SerialChannel,
    requests: &'static RequestChannel,
    reports: &'static ReportChannel,
    statuses: &'static StatusChannel,
) {
    let config = engine_config();
    let mut engine = Engine::new(FrameQueue::<REPORT_QUEUE_DEPTH>::new(), identity, config);
    let mut reports = ReportForwarder::new(reports);
    let mut statuses = StatusForwarder::new(statuses);
    info!("ticking every {} ms", config.tick_interval_ms);

    let mut ticker = Ticker::every(Duration::from_millis(u64::from(config.tick_interval_ms)));
    loop {
        match select3(ticker.next(), serial.receive(), requests.receive()).await {
            Either3::First(()) => {
                let outcome = engine.tick(Instant::now().as_millis());
                if outcome.retries.dropped > 0 {
                    warn!("{} replies dropped unacknowledged", outcome.retries.dropped);
                }

                // Both forwarders only try_send, so these complete without waiting.
                if let Err(e) = engine.link_mut().transport_mut().flush(&mut reports).await {
                    debug!("Report dropped: {:?}", e);
                }
                if let Err(e) = engine.flush_status(&mut statuses).await {
                    warn!("Status line dropped: {:?}", e);
                }
            }
            Either3::Second(chunk) => engine.feed_serial(&chunk),
            Either3::Third(request) => {
                if !engine.on_output_report(request.as_bytes()) {
                    debug!("ignored output report ({} bytes)", request.as_bytes().len());
                }
            }
        }
    }
}
