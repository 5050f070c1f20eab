//! USB HID Pro Controller endpoint.
//!
//! Input reports (0x30, 0x3F, 0x21, 0x81) go out on the interrupt IN
//! endpoint; console requests (0x01, 0x10, 0x80) arrive on the interrupt OUT
//! endpoint. Every report carries its id as the first byte.

use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_usb::class::hid::{
    Config, HidBootProtocol, HidReader, HidReaderWriter, HidSubclass, HidWriter, ReadError, State,
};
use embassy_usb::driver::EndpointError;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::Builder;
use procon_core::{Frame, LinkError, ReportSink};
use procon_proto::{ControllerKind, MAX_REPORT_LEN};

/// Nintendo Co., Ltd.
pub const VENDOR_ID: u16 = 0x057E;

/// USB product id announced for each controller class.
#[must_use]
pub const fn product_id(kind: ControllerKind) -> u16 {
    match kind {
        ControllerKind::ProController => 0x2009,
        ControllerKind::JoyConLeft => 0x2006,
        ControllerKind::JoyConRight => 0x2007,
    }
}

/// USB product string for each controller class.
#[must_use]
pub const fn product_name(kind: ControllerKind) -> &'static str {
    match kind {
        ControllerKind::ProController => "Pro Controller",
        ControllerKind::JoyConLeft => "Joy-Con (L)",
        ControllerKind::JoyConRight => "Joy-Con (R)",
    }
}

/// Console polling interval; matches the 8 ms report cadence.
pub const POLL_MS: u8 = 8;

/// Pro Controller HID report descriptor.
///
/// Declares the simple input report (0x30 layout as seen by generic hosts),
/// the vendor-defined 0x21/0x81 replies and the 0x01/0x10/0x80/0x82 output
/// reports, each 63 bytes after the id.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x15, 0x00, // Logical Minimum (0)
    0x09, 0x04, // Usage (Joystick)
    0xA1, 0x01, // Collection (Application)
    //
    // --- 0x30: buttons, sticks, hat ---
    0x85, 0x30, //   Report ID (48)
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x0A, //   Usage Maximum (10)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x0A, //   Report Count (10)
    0x55, 0x00, //   Unit Exponent (0)
    0x65, 0x00, //   Unit (None)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x0B, //   Usage Minimum (11)
    0x29, 0x0E, //   Usage Maximum (14)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x03, //   Input (Constant, Variable, Absolute)
    0x0B, 0x01, 0x00, 0x01, 0x00, // Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x0B, 0x30, 0x00, 0x01, 0x00, // Usage (X)
    0x0B, 0x31, 0x00, 0x01, 0x00, // Usage (Y)
    0x0B, 0x32, 0x00, 0x01, 0x00, // Usage (Z)
    0x0B, 0x35, 0x00, 0x01, 0x00, // Usage (Rz)
    0x15, 0x00, //     Logical Minimum (0)
    0x27, 0xFF, 0xFF, 0x00, 0x00, // Logical Maximum (65535)
    0x75, 0x10, //     Report Size (16)
    0x95, 0x04, //     Report Count (4)
    0x81, 0x02, //     Input (Data, Variable, Absolute)
    0xC0, //   End Collection
    0x0B, 0x39, 0x00, 0x01, 0x00, // Usage (Hat Switch)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x07, //   Logical Maximum (7)
    0x35, 0x00, //   Physical Minimum (0)
    0x46, 0x3B, 0x01, // Physical Maximum (315)
    0x65, 0x14, //   Unit (Degrees)
    0x75, 0x04, //   Report Size (4)
    0x95, 0x01, //   Report Count (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x0F, //   Usage Minimum (15)
    0x29, 0x12, //   Usage Maximum (18)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x04, //   Report Count (4)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x34, //   Report Count (52)
    0x81, 0x03, //   Input (Constant, Variable, Absolute)
    //
    // --- Vendor reports ---
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined)
    0x85, 0x21, //   Report ID (33): subcommand reply
    0x09, 0x01, //   Usage (1)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x81, 0x03, //   Input (Constant, Variable, Absolute)
    0x85, 0x81, //   Report ID (129): host-link reply
    0x09, 0x02, //   Usage (2)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x81, 0x03, //   Input (Constant, Variable, Absolute)
    0x85, 0x01, //   Report ID (1): rumble + subcommand
    0x09, 0x03, //   Usage (3)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x91, 0x83, //   Output (Constant, Variable, Absolute, Volatile)
    0x85, 0x10, //   Report ID (16): rumble only
    0x09, 0x04, //   Usage (4)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x91, 0x83, //   Output (Constant, Variable, Absolute, Volatile)
    0x85, 0x80, //   Report ID (128): host-link command
    0x09, 0x05, //   Usage (5)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x91, 0x83, //   Output (Constant, Variable, Absolute, Volatile)
    0x85, 0x82, //   Report ID (130)
    0x09, 0x06, //   Usage (6)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x3F, //   Report Count (63)
    0x91, 0x83, //   Output (Constant, Variable, Absolute, Volatile)
    //
    0xC0, // End Collection
];

type UsbDriver<'d> = Driver<'d, USB>;

/// One console request as received from the OUT endpoint.
#[derive(Clone, Copy)]
pub struct ConsoleRequest {
    len: usize,
    bytes: [u8; MAX_REPORT_LEN],
}

impl ConsoleRequest {
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Writes reports to the IN endpoint.
pub struct UsbReportSink<'d> {
    writer: HidWriter<'d, UsbDriver<'d>, MAX_REPORT_LEN>,
}

impl<'d> UsbReportSink<'d> {
    /// Wait until the device is ready (USB enumerated).
    pub async fn wait_ready(&mut self) {
        self.writer.ready().await;
    }
}

impl ReportSink for UsbReportSink<'_> {
    async fn send(&mut self, report: &[u8]) -> Result<(), LinkError> {
        self.writer.write(report).await.map_err(|e| match e {
            EndpointError::Disabled => LinkError::NotReady,
            EndpointError::BufferOverflow => LinkError::Oversized,
        })
    }
}

/// Frames handed from the control task to the report task.
pub type ReportChannel = Channel<CriticalSectionRawMutex, Frame, REPORT_CHANNEL_DEPTH>;

/// Depth of the channel in front of the IN endpoint.
pub const REPORT_CHANNEL_DEPTH: usize = 4;

/// [`ReportSink`] that hands frames to the report task without waiting.
///
/// A full channel refuses the frame with [`LinkError::Busy`], so a stalled
/// endpoint never holds up a tick.
pub struct ReportForwarder {
    channel: &'static ReportChannel,
}

impl ReportForwarder {
    pub fn new(channel: &'static ReportChannel) -> Self {
        Self { channel }
    }
}

impl ReportSink for ReportForwarder {
    async fn send(&mut self, report: &[u8]) -> Result<(), LinkError> {
        let frame = Frame::new(report)?;
        self.channel.try_send(frame).map_err(|_| LinkError::Busy)
    }
}

/// Reads console requests from the OUT endpoint.
pub struct UsbRequestReader<'d> {
    reader: HidReader<'d, UsbDriver<'d>, MAX_REPORT_LEN>,
}

impl<'d> UsbRequestReader<'d> {
    /// Wait for the next console request.
    pub async fn read(&mut self) -> Result<ConsoleRequest, LinkError> {
        let mut request = ConsoleRequest {
            len: 0,
            bytes: [0; MAX_REPORT_LEN],
        };
        request.len = self.reader.read(&mut request.bytes).await.map_err(|e| match e {
            ReadError::Disabled => LinkError::NotReady,
            ReadError::BufferOverflow => LinkError::Oversized,
            _ => LinkError::Io,
        })?;
        Ok(request)
    }
}

/// Configure the Pro Controller HID class in the USB builder.
///
/// Returns the request reader and the report sink.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, UsbDriver<'d>>,
    state: &'d mut State<'d>,
) -> (UsbRequestReader<'d>, UsbReportSink<'d>) {
    let config = Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: None,
        poll_ms: POLL_MS,
        max_packet_size: MAX_REPORT_LEN as u16,
        hid_subclass: HidSubclass::No,
        hid_boot_protocol: HidBootProtocol::None,
    };

    let hid = HidReaderWriter::<_, MAX_REPORT_LEN, MAX_REPORT_LEN>::new(builder, state, config);
    let (reader, writer) = hid.split();
    (
        UsbRequestReader { reader },
        UsbReportSink { writer },
    )
}
