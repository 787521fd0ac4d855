//! PTZ operations and their SOAP bodies.

use crate::auth::escape_xml;

pub const PTZ_WSDL_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const SCHEMA_NS: &str = "http://www.onvif.org/ver10/schema";
const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Default pan/tilt speed for directional helpers
pub const DEFAULT_PAN_TILT_SPEED: f32 = 0.5;
/// Default zoom speed for directional helpers
pub const DEFAULT_ZOOM_SPEED: f32 = 0.3;

/// Clamp a velocity component to [-1.0, 1.0]. NaN becomes 0.
pub fn clamp_speed(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// One PTZ request
#[derive(Debug, Clone, PartialEq)]
pub enum PtzCommand {
    ContinuousMove { pan: f32, tilt: f32, zoom: f32 },
    Stop,
    GotoPreset { token: String },
}

impl PtzCommand {
    pub fn continuous_move(pan: f32, tilt: f32, zoom: f32) -> Self {
        PtzCommand::ContinuousMove {
            pan: clamp_speed(pan),
            tilt: clamp_speed(tilt),
            zoom: clamp_speed(zoom),
        }
    }

    pub fn pan_left(speed: f32) -> Self {
        Self::continuous_move(-speed.abs(), 0.0, 0.0)
    }

    pub fn pan_right(speed: f32) -> Self {
        Self::continuous_move(speed.abs(), 0.0, 0.0)
    }

    pub fn tilt_up(speed: f32) -> Self {
        Self::continuous_move(0.0, speed.abs(), 0.0)
    }

    pub fn tilt_down(speed: f32) -> Self {
        Self::continuous_move(0.0, -speed.abs(), 0.0)
    }

    pub fn zoom_in(speed: f32) -> Self {
        Self::continuous_move(0.0, 0.0, speed.abs())
    }

    pub fn zoom_out(speed: f32) -> Self {
        Self::continuous_move(0.0, 0.0, -speed.abs())
    }

    pub fn goto_preset(token: impl Into<String>) -> Self {
        PtzCommand::GotoPreset {
            token: token.into(),
        }
    }

    /// ONVIF operation name
    pub fn operation(&self) -> &'static str {
        match self {
            PtzCommand::ContinuousMove { .. } => "ContinuousMove",
            PtzCommand::Stop => "Stop",
            PtzCommand::GotoPreset { .. } => "GotoPreset",
        }
    }

    /// SOAP action URI carried in the Content-Type header
    pub fn action(&self) -> String {
        format!("{}/{}", PTZ_WSDL_NS, self.operation())
    }

    /// Body element for this command. Velocities are clamped again here so
    /// a hand-built variant cannot send out-of-range values.
    pub fn body_xml(&self, profile_token: &str) -> String {
        let profile = escape_xml(profile_token);
        match self {
            PtzCommand::ContinuousMove { pan, tilt, zoom } => format!(
                r#"<tptz:ContinuousMove xmlns:tptz="{ptz}">
      <tptz:ProfileToken>{profile}</tptz:ProfileToken>
      <tptz:Velocity>
        <tt:PanTilt xmlns:tt="{schema}" x="{pan}" y="{tilt}"/>
        <tt:Zoom xmlns:tt="{schema}" x="{zoom}"/>
      </tptz:Velocity>
    </tptz:ContinuousMove>"#,
                ptz = PTZ_WSDL_NS,
                schema = SCHEMA_NS,
                profile = profile,
                pan = clamp_speed(*pan),
                tilt = clamp_speed(*tilt),
                zoom = clamp_speed(*zoom),
            ),
            PtzCommand::Stop => format!(
                r#"<tptz:Stop xmlns:tptz="{ptz}">
      <tptz:ProfileToken>{profile}</tptz:ProfileToken>
      <tptz:PanTilt>true</tptz:PanTilt>
      <tptz:Zoom>true</tptz:Zoom>
    </tptz:Stop>"#,
                ptz = PTZ_WSDL_NS,
                profile = profile,
            ),
            PtzCommand::GotoPreset { token } => format!(
                r#"<tptz:GotoPreset xmlns:tptz="{ptz}">
      <tptz:ProfileToken>{profile}</tptz:ProfileToken>
      <tptz:PresetToken>{token}</tptz:PresetToken>
    </tptz:GotoPreset>"#,
                ptz = PTZ_WSDL_NS,
                profile = profile,
                token = escape_xml(token),
            ),
        }
    }
}

/// Wrap a header element and a body element in a SOAP 1.2 envelope.
pub fn envelope(header: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="{soap}">
  <s:Header>
    {header}
  </s:Header>
  <s:Body>
    {body}
  </s:Body>
</s:Envelope>"#,
        soap = SOAP_ENV_NS,
        header = header,
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_move_is_clamped() {
        assert_eq!(
            PtzCommand::continuous_move(1.5, -2.0, 0.25),
            PtzCommand::ContinuousMove {
                pan: 1.0,
                tilt: -1.0,
                zoom: 0.25
            }
        );
        assert_eq!(clamp_speed(f32::NAN), 0.0);
        assert_eq!(clamp_speed(f32::INFINITY), 1.0);
    }

    #[test]
    fn test_hand_built_move_is_clamped_on_the_wire() {
        let raw = PtzCommand::ContinuousMove {
            pan: 1.5,
            tilt: -2.0,
            zoom: 0.0,
        };
        let xml = raw.body_xml("Profile_1");
        assert!(xml.contains(r#"x="1" y="-1""#));
        assert!(xml.contains(r#"<tt:Zoom xmlns:tt="http://www.onvif.org/ver10/schema" x="0"/>"#));
    }

    #[test]
    fn test_directional_helpers() {
        assert_eq!(
            PtzCommand::pan_left(DEFAULT_PAN_TILT_SPEED),
            PtzCommand::continuous_move(-0.5, 0.0, 0.0)
        );
        assert_eq!(
            PtzCommand::tilt_down(-0.5),
            PtzCommand::continuous_move(0.0, -0.5, 0.0)
        );
        assert_eq!(
            PtzCommand::zoom_in(DEFAULT_ZOOM_SPEED),
            PtzCommand::continuous_move(0.0, 0.0, 0.3)
        );
        assert_eq!(
            PtzCommand::zoom_out(4.0),
            PtzCommand::continuous_move(0.0, 0.0, -1.0)
        );
    }

    #[test]
    fn test_stop_and_preset_bodies() {
        let stop = PtzCommand::Stop.body_xml("Profile_1");
        assert!(stop.contains("<tptz:PanTilt>true</tptz:PanTilt>"));
        assert!(stop.contains("<tptz:Zoom>true</tptz:Zoom>"));

        let preset = PtzCommand::goto_preset("a<b").body_xml("Profile_1");
        assert!(preset.contains("<tptz:PresetToken>a&lt;b</tptz:PresetToken>"));
        assert_eq!(
            PtzCommand::goto_preset("1").action(),
            "http://www.onvif.org/ver20/ptz/wsdl/GotoPreset"
        );
    }
}
