//! # Dialect Conversion (spec component C2, partial)
//!
//! Translates between the wire-level `mavlink::common::MavMessage` the
//! protocol engine produces/consumes and the `MavlinkMessage` protobuf type
//! exposed over gRPC. Field-level encode/decode and the full common-dialect
//! schema are owned by the linked `mavlink` crate; this module only maps a
//! representative subset of message types into typed protobuf variants.
//! Everything else round-trips through the `RawMessage` fallback rather than
//! being dropped, so routing and fan-out stay uniform across the whole
//! dialect even where this module hasn't grown a typed mapping yet.

use mavlink::common::{
    MavMessage, MavModeFlag, MavSysStatusSensor, ATTITUDE_DATA, COMMAND_ACK_DATA,
    COMMAND_LONG_DATA, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA, PING_DATA,
    STATUSTEXT_DATA, SYS_STATUS_DATA, VFR_HUD_DATA,
};
use mavlink::{MavHeader, MavlinkVersion, Message as _};

use crate::pb::{self, mavlink_message::Payload};
use crate::transport::MAX_PACKET_LEN;

/// Converts a wire-level frame into its structured protobuf form. The
/// `system_id`/`component_id`/`sequence` come from the frame's header;
/// `message_id` and the typed (or raw) payload come from the message body.
pub fn to_structured(header: MavHeader, message: &MavMessage) -> pb::MavlinkMessage {
    pb::MavlinkMessage {
        system_id: header.system_id as u32,
        component_id: header.component_id as u32,
        message_id: message.message_id(),
        sequence: header.sequence as u32,
        payload: Some(to_payload(message)),
    }
}

fn to_payload(message: &MavMessage) -> Payload {
    match message {
        MavMessage::HEARTBEAT(d) => Payload::Heartbeat(pb::Heartbeat {
            custom_mode: d.custom_mode,
            mavtype: d.mavtype as u32,
            autopilot: d.autopilot as u32,
            base_mode: d.base_mode.bits() as u32,
            system_status: d.system_status as u32,
            mavlink_version: d.mavlink_version as u32,
        }),
        MavMessage::SYS_STATUS(d) => Payload::SysStatus(pb::SysStatus {
            onboard_control_sensors_present: d.onboard_control_sensors_present.bits(),
            onboard_control_sensors_enabled: d.onboard_control_sensors_enabled.bits(),
            onboard_control_sensors_health: d.onboard_control_sensors_health.bits(),
            load: d.load as u32,
            voltage_battery: d.voltage_battery as u32,
            current_battery: d.current_battery as i32,
            battery_remaining: d.battery_remaining as i32,
            drop_rate_comm: d.drop_rate_comm as u32,
            errors_comm: d.errors_comm as u32,
        }),
        MavMessage::GPS_RAW_INT(d) => Payload::GpsRawInt(pb::GpsRawInt {
            time_usec: d.time_usec,
            fix_type: d.fix_type as u32,
            lat: d.lat,
            lon: d.lon,
            alt: d.alt,
            eph: d.eph as u32,
            epv: d.epv as u32,
            vel: d.vel as u32,
            cog: d.cog as u32,
            satellites_visible: d.satellites_visible as u32,
        }),
        MavMessage::ATTITUDE(d) => Payload::Attitude(pb::Attitude {
            time_boot_ms: d.time_boot_ms,
            roll: d.roll,
            pitch: d.pitch,
            yaw: d.yaw,
            rollspeed: d.rollspeed,
            pitchspeed: d.pitchspeed,
            yawspeed: d.yawspeed,
        }),
        MavMessage::GLOBAL_POSITION_INT(d) => Payload::GlobalPositionInt(pb::GlobalPositionInt {
            time_boot_ms: d.time_boot_ms,
            lat: d.lat,
            lon: d.lon,
            alt: d.alt,
            relative_alt: d.relative_alt,
            vx: d.vx as i32,
            vy: d.vy as i32,
            vz: d.vz as i32,
            hdg: d.hdg as u32,
        }),
        MavMessage::VFR_HUD(d) => Payload::VfrHud(pb::VfrHud {
            airspeed: d.airspeed,
            groundspeed: d.groundspeed,
            heading: d.heading as i32,
            throttle: d.throttle as u32,
            alt: d.alt,
            climb: d.climb,
        }),
        MavMessage::COMMAND_ACK(d) => Payload::CommandAck(pb::CommandAck {
            command: d.command as u32,
            result: d.result as u32,
        }),
        MavMessage::COMMAND_LONG(d) => Payload::CommandLong(pb::CommandLong {
            command: d.command as u32,
            confirmation: d.confirmation as u32,
            param1: d.param1,
            param2: d.param2,
            param3: d.param3,
            param4: d.param4,
            param5: d.param5,
            param6: d.param6,
            param7: d.param7,
        }),
        MavMessage::STATUSTEXT(d) => Payload::Statustext(pb::StatusText {
            severity: d.severity as u32,
            text: text_field_to_string(&d.text),
        }),
        MavMessage::PING(d) => Payload::Ping(pb::Ping {
            time_usec: d.time_usec,
            seq: d.seq,
        }),
        other => {
            let mut buf = [0u8; MAX_PACKET_LEN];
            let n = other.ser(MavlinkVersion::V2, &mut buf);
            Payload::Raw(pb::RawMessage {
                payload: buf[..n].to_vec(),
            })
        }
    }
}

/// STATUSTEXT's `text` field is a fixed-width, NUL-padded byte array on the
/// wire; trim the padding before handing it to callers as a `String`.
fn text_field_to_string(text: &[u8]) -> String {
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    String::from_utf8_lossy(&text[..end]).into_owned()
}

/// Converts a structured protobuf message back into wire form for
/// transmission. Returns `None` for `RawMessage` payloads this module
/// doesn't know how to reconstruct a typed `MavMessage` from — callers
/// should reject those with `INVALID_ARGUMENT` rather than silently drop
/// them, matching spec.md section 4.4's unary send validation.
pub fn to_wire(message: &pb::MavlinkMessage) -> Option<MavMessage> {
    match message.payload.as_ref()? {
        Payload::Heartbeat(h) => Some(MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: h.custom_mode,
            mavtype: mavlink_enum(h.mavtype),
            autopilot: mavlink_enum(h.autopilot),
            base_mode: MavModeFlag::from_bits_truncate(h.base_mode as u8),
            system_status: mavlink_enum(h.system_status),
            mavlink_version: h.mavlink_version as u8,
        })),
        Payload::SysStatus(s) => Some(MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            onboard_control_sensors_present: MavSysStatusSensor::from_bits_truncate(
                s.onboard_control_sensors_present,
            ),
            onboard_control_sensors_enabled: MavSysStatusSensor::from_bits_truncate(
                s.onboard_control_sensors_enabled,
            ),
            onboard_control_sensors_health: MavSysStatusSensor::from_bits_truncate(
                s.onboard_control_sensors_health,
            ),
            load: s.load as u16,
            voltage_battery: s.voltage_battery as u16,
            current_battery: s.current_battery as i16,
            battery_remaining: s.battery_remaining as i8,
            drop_rate_comm: s.drop_rate_comm as u16,
            errors_comm: s.errors_comm as u16,
            ..Default::default()
        })),
        Payload::GpsRawInt(g) => Some(MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
            time_usec: g.time_usec,
            lat: g.lat,
            lon: g.lon,
            alt: g.alt,
            eph: g.eph as u16,
            epv: g.epv as u16,
            vel: g.vel as u16,
            cog: g.cog as u16,
            fix_type: mavlink_enum(g.fix_type),
            satellites_visible: g.satellites_visible as u8,
        })),
        Payload::Attitude(a) => Some(MavMessage::ATTITUDE(ATTITUDE_DATA {
            time_boot_ms: a.time_boot_ms,
            roll: a.roll,
            pitch: a.pitch,
            yaw: a.yaw,
            rollspeed: a.rollspeed,
            pitchspeed: a.pitchspeed,
            yawspeed: a.yawspeed,
        })),
        Payload::GlobalPositionInt(p) => Some(MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: p.time_boot_ms,
            lat: p.lat,
            lon: p.lon,
            alt: p.alt,
            relative_alt: p.relative_alt,
            vx: p.vx as i16,
            vy: p.vy as i16,
            vz: p.vz as i16,
            hdg: p.hdg as u16,
        })),
        Payload::VfrHud(v) => Some(MavMessage::VFR_HUD(VFR_HUD_DATA {
            airspeed: v.airspeed,
            groundspeed: v.groundspeed,
            heading: v.heading as i16,
            throttle: v.throttle as u16,
            alt: v.alt,
            climb: v.climb,
        })),
        Payload::CommandAck(c) => Some(MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: mavlink_enum(c.command),
            result: mavlink_enum(c.result),
        })),
        Payload::CommandLong(c) => Some(MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            command: mavlink_enum(c.command),
            confirmation: c.confirmation as u8,
            param1: c.param1,
            param2: c.param2,
            param3: c.param3,
            param4: c.param4,
            param5: c.param5,
            param6: c.param6,
            param7: c.param7,
            ..Default::default()
        })),
        Payload::Statustext(s) => Some(MavMessage::STATUSTEXT(STATUSTEXT_DATA {
            severity: mavlink_enum(s.severity),
            text: string_to_text_field(&s.text),
        })),
        Payload::Ping(p) => Some(MavMessage::PING(PING_DATA {
            time_usec: p.time_usec,
            seq: p.seq,
            ..Default::default()
        })),
        Payload::Raw(_) => None,
    }
}

/// Reinterprets a plain `u32` as one of the `mavlink` crate's generated
/// dialect enums, falling back to that enum's default variant if the caller
/// sent a discriminant outside the known range.
fn mavlink_enum<T>(raw: u32) -> T
where
    T: TryFrom<u32> + Default,
{
    T::try_from(raw).unwrap_or_default()
}

fn string_to_text_field(s: &str) -> [u8; 50] {
    let mut buf = [0u8; 50];
    let bytes = s.as_bytes();
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_round_trips_through_structured_form() {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 5,
        };
        let message = MavMessage::HEARTBEAT(HEARTBEAT_DATA::default());
        let structured = to_structured(header, &message);
        assert_eq!(structured.system_id, 1);
        assert_eq!(structured.sequence, 5);
        assert!(matches!(structured.payload, Some(Payload::Heartbeat(_))));
    }

    #[test]
    fn statustext_trims_nul_padding() {
        let mut text = [0u8; 50];
        text[..5].copy_from_slice(b"ready");
        assert_eq!(text_field_to_string(&text), "ready");
    }

    #[test]
    fn raw_payload_does_not_convert_back_to_wire() {
        let message = pb::MavlinkMessage {
            system_id: 1,
            component_id: 1,
            message_id: 9999,
            sequence: 0,
            payload: Some(Payload::Raw(pb::RawMessage { payload: vec![1, 2, 3] })),
        };
        assert!(to_wire(&message).is_none());
    }

    #[test]
    fn empty_payload_does_not_convert_to_wire() {
        let message = pb::MavlinkMessage {
            system_id: 1,
            component_id: 1,
            message_id: 0,
            sequence: 0,
            payload: None,
        };
        assert!(to_wire(&message).is_none());
    }
}
