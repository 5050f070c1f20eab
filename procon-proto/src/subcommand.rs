//! Subcommand dispatch.
//!
//! Every request the console embeds in a 0x01 output report is routed through
//! [`DISPATCH`], a fixed table of pure handlers keyed by subcommand id. A
//! handler sees the request and a read-only [`Context`] and returns a
//! [`Reply`]: the ack byte, the reply payload and at most one [`Effect`] the
//! protocol layer applies afterwards. Unknown ids get a plain ack.

use heapless::Vec;

use crate::protocol::DeviceIdentity;
use crate::report::{ControllerKind, ReportMode, REPLY_DATA_LEN};
use crate::spi;
use crate::types::PairingState;

pub const PAIRING: u8 = 0x01;
pub const DEVICE_INFO: u8 = 0x02;
pub const SET_REPORT_MODE: u8 = 0x03;
pub const TRIGGER_ELAPSED: u8 = 0x04;
pub const SET_HCI_STATE: u8 = 0x06;
pub const RESET_PAIRING_INFO: u8 = 0x07;
pub const SET_SHIPMENT_MODE: u8 = 0x08;
pub const SPI_READ: u8 = 0x10;
pub const SET_MCU_CONFIG: u8 = 0x21;
pub const SET_MCU_STATE: u8 = 0x22;
pub const SET_PLAYER_LIGHTS: u8 = 0x30;
pub const SET_HOME_LIGHT: u8 = 0x38;
pub const ENABLE_IMU: u8 = 0x40;
pub const SET_IMU_SENSITIVITY: u8 = 0x41;
pub const ENABLE_VIBRATION: u8 = 0x48;

/// Plain acknowledgment with no payload.
pub const ACK: u8 = 0x80;
/// Negative acknowledgment.
pub const NACK: u8 = 0x00;

/// Name announced during the pairing exchange.
pub const DEVICE_NAME: &[u8] = b"Pro Controller";

const FIRMWARE_VERSION: [u8; 2] = [0x03, 0x48];

/// A decoded subcommand request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub id: u8,
    pub data: &'a [u8],
}

impl Request<'_> {
    /// Argument byte at `index`, zero when the console sent a short request.
    #[inline]
    #[must_use]
    pub fn arg(&self, index: usize) -> u8 {
        self.data.get(index).copied().unwrap_or(0)
    }
}

/// Read-only view of the device handed to every handler.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    pub identity: &'a DeviceIdentity,
    pub pairing: PairingState,
    pub kind: ControllerKind,
}

/// State change requested by a subcommand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    SetReportMode(ReportMode),
    SetImu(bool),
    SetVibration(bool),
    SetPlayerLights(u8),
}

/// Handler result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub ack: u8,
    pub data: Vec<u8, REPLY_DATA_LEN>,
    pub effect: Option<Effect>,
}

impl Reply {
    #[must_use]
    pub fn ack(ack: u8) -> Self {
        Self {
            ack,
            data: Vec::new(),
            effect: None,
        }
    }

    /// Build a reply, truncating `bytes` to the reply payload capacity.
    #[must_use]
    pub fn with_data(ack: u8, bytes: &[u8]) -> Self {
        let mut reply = Self::ack(ack);
        reply.extend(bytes);
        reply
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.data.push(b).is_err() {
                break;
            }
        }
    }
}

/// A subcommand handler: pure function of request and context.
pub type Handler = fn(&Request<'_>, &Context<'_>) -> Reply;

/// Subcommand id to handler.
pub const DISPATCH: [(u8, Handler); 15] = [
    (PAIRING, pairing),
    (DEVICE_INFO, device_info),
    (SET_REPORT_MODE, set_report_mode),
    (TRIGGER_ELAPSED, trigger_elapsed),
    (SET_HCI_STATE, plain_ack),
    (RESET_PAIRING_INFO, plain_ack),
    (SET_SHIPMENT_MODE, plain_ack),
    (SPI_READ, spi_read),
    (SET_MCU_CONFIG, mcu_config),
    (SET_MCU_STATE, plain_ack),
    (SET_PLAYER_LIGHTS, player_lights),
    (SET_HOME_LIGHT, plain_ack),
    (ENABLE_IMU, enable_imu),
    (SET_IMU_SENSITIVITY, plain_ack),
    (ENABLE_VIBRATION, enable_vibration),
];

/// Look up the handler for `request.id` and run it.
#[must_use]
pub fn dispatch(request: &Request<'_>, ctx: &Context<'_>) -> Reply {
    DISPATCH
        .iter()
        .find(|(id, _)| *id == request.id)
        .map_or_else(|| plain_ack(request, ctx), |(_, handler)| handler(request, ctx))
}

fn plain_ack(_: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::ack(ACK)
}

/// Three-step bonding exchange, only answered while discoverable.
fn pairing(request: &Request<'_>, ctx: &Context<'_>) -> Reply {
    if !ctx.pairing.is_discoverable() {
        return Reply::ack(NACK);
    }

    let step = request.arg(0);
    let mut reply = Reply::with_data(0x81, &[step]);
    match step {
        0x01 => {
            reply.extend(&ctx.identity.mac_reversed());
            let mut name = [0u8; 20];
            name[..DEVICE_NAME.len()].copy_from_slice(DEVICE_NAME);
            reply.extend(&name);
        }
        0x02 => reply.extend(&ctx.identity.link_key),
        _ => {}
    }
    reply
}

fn device_info(_: &Request<'_>, ctx: &Context<'_>) -> Reply {
    let mut reply = Reply::with_data(0x82, &FIRMWARE_VERSION);
    reply.extend(&[ctx.kind.device_type(), 0x02]);
    reply.extend(&ctx.identity.mac);
    // Colors come from SPI flash.
    reply.extend(&[0x01, 0x01]);
    reply
}

fn set_report_mode(request: &Request<'_>, _: &Context<'_>) -> Reply {
    let reply = Reply::ack(ACK);
    match ReportMode::from_report_id(request.arg(0)) {
        Some(mode) => reply.with_effect(Effect::SetReportMode(mode)),
        None => reply,
    }
}

fn trigger_elapsed(_: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::with_data(0x83, &[0u8; 14])
}

fn spi_read(request: &Request<'_>, _: &Context<'_>) -> Reply {
    let address = u32::from_le_bytes([
        request.arg(0),
        request.arg(1),
        request.arg(2),
        request.arg(3),
    ]);
    let len = usize::from(request.arg(4)).min(spi::MAX_READ_LEN);

    let mut contents = [0u8; spi::MAX_READ_LEN];
    spi::read(address, &mut contents[..len]);

    let mut reply = Reply::with_data(0x90, &address.to_le_bytes());
    // `len` is bounded by MAX_READ_LEN.
    reply.extend(&[len as u8]);
    reply.extend(&contents[..len]);
    reply
}

fn mcu_config(_: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::with_data(0xA0, &[0x01, 0x00, 0xFF, 0x00, 0x03, 0x00, 0x05, 0x01])
}

fn player_lights(request: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::ack(ACK).with_effect(Effect::SetPlayerLights(request.arg(0)))
}

fn enable_imu(request: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::ack(ACK).with_effect(Effect::SetImu(request.arg(0) != 0))
}

fn enable_vibration(request: &Request<'_>, _: &Context<'_>) -> Reply {
    Reply::ack(ACK).with_effect(Effect::SetVibration(request.arg(0) != 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: DeviceIdentity = DeviceIdentity {
        mac: [0x98, 0xB6, 0xE9, 0x12, 0x34, 0x56],
        link_key: [0xA5; 16],
    };

    fn ctx(discoverable: bool) -> Context<'static> {
        let mut pairing = PairingState::new();
        if discoverable {
            pairing.enable();
        }
        Context {
            identity: &IDENTITY,
            pairing,
            kind: ControllerKind::ProController,
        }
    }

    fn request(id: u8, data: &[u8]) -> Request<'_> {
        Request { id, data }
    }

    #[test]
    fn test_table_ids_unique() {
        for (i, (a, _)) in DISPATCH.iter().enumerate() {
            assert!(DISPATCH[i + 1..].iter().all(|(b, _)| a != b));
        }
    }

    #[test]
    fn test_unknown_subcommand_acked_without_effect() {
        let reply = dispatch(&request(0x5A, &[1, 2, 3]), &ctx(false));
        assert_eq!(reply.ack, ACK);
        assert!(reply.data.is_empty());
        assert_eq!(reply.effect, None);
    }

    #[test]
    fn test_pairing_refused_when_not_discoverable() {
        let reply = dispatch(&request(PAIRING, &[0x01]), &ctx(false));
        assert_eq!(reply.ack, NACK);
        assert!(reply.data.is_empty());
    }

    #[test]
    fn test_pairing_step_one_announces_identity() {
        let reply = dispatch(&request(PAIRING, &[0x01]), &ctx(true));
        assert_eq!(reply.ack, 0x81);
        assert_eq!(reply.data[0], 0x01);
        assert_eq!(&reply.data[1..7], &[0x56, 0x34, 0x12, 0xE9, 0xB6, 0x98]);
        assert_eq!(&reply.data[7..7 + DEVICE_NAME.len()], DEVICE_NAME);
    }

    #[test]
    fn test_pairing_step_two_sends_link_key() {
        let reply = dispatch(&request(PAIRING, &[0x02]), &ctx(true));
        assert_eq!(reply.data[0], 0x02);
        assert_eq!(&reply.data[1..17], &[0xA5; 16]);
    }

    #[test]
    fn test_device_info() {
        let reply = dispatch(&request(DEVICE_INFO, &[]), &ctx(false));
        assert_eq!(reply.ack, 0x82);
        assert_eq!(
            &reply.data[..],
            &[0x03, 0x48, 0x03, 0x02, 0x98, 0xB6, 0xE9, 0x12, 0x34, 0x56, 0x01, 0x01]
        );
    }

    #[test]
    fn test_report_mode_switch() {
        let reply = dispatch(&request(SET_REPORT_MODE, &[0x3F]), &ctx(false));
        assert_eq!(reply.effect, Some(Effect::SetReportMode(ReportMode::Simple)));

        // Unsupported mode is acked and ignored.
        let reply = dispatch(&request(SET_REPORT_MODE, &[0x31]), &ctx(false));
        assert_eq!(reply.ack, ACK);
        assert_eq!(reply.effect, None);
    }

    #[test]
    fn test_spi_read_echoes_address_and_length() {
        let reply = dispatch(&request(SPI_READ, &[0x50, 0x60, 0x00, 0x00, 0x03]), &ctx(false));
        assert_eq!(reply.ack, 0x90);
        assert_eq!(&reply.data[..], &[0x50, 0x60, 0x00, 0x00, 0x03, 0x82, 0x82, 0x82]);
    }

    #[test]
    fn test_spi_read_length_clamped() {
        let reply = dispatch(&request(SPI_READ, &[0x00, 0x60, 0x00, 0x00, 0xFF]), &ctx(false));
        assert_eq!(reply.data[4], spi::MAX_READ_LEN as u8);
        assert_eq!(reply.data.len(), 5 + spi::MAX_READ_LEN);
    }

    #[test]
    fn test_short_request_treated_as_zero_args() {
        let reply = dispatch(&request(ENABLE_IMU, &[]), &ctx(false));
        assert_eq!(reply.effect, Some(Effect::SetImu(false)));
    }

    #[test]
    fn test_vibration_and_lights_effects() {
        let reply = dispatch(&request(ENABLE_VIBRATION, &[0x01]), &ctx(false));
        assert_eq!(reply.effect, Some(Effect::SetVibration(true)));

        let reply = dispatch(&request(SET_PLAYER_LIGHTS, &[0x01]), &ctx(false));
        assert_eq!(reply.effect, Some(Effect::SetPlayerLights(0x01)));
    }
}
