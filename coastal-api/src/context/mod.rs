//! Chat context: request-supplied hints plus live weather/traffic data.
//!
//! The assembler turns whatever context is present into a bulleted block
//! appended to the user prompt. Absent fields are omitted entirely; with no
//! context at all the prompt is the bare message.

pub mod traffic;
pub mod weather;

pub use traffic::{TrafficClient, TrafficSummary};
pub use weather::{WeatherClient, WeatherReport};

use serde::{Deserialize, Serialize};

/// Context accompanying a chat message. All fields optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatContext {
    /// Template selector: "safety_evaluation", "general_safety_info", or
    /// absent for the standard chat template.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Marks messages seeded by the application rather than the user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_system_generated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,

    #[serde(rename = "floodZone", skip_serializing_if = "Option::is_none")]
    pub flood_zone: Option<FloodZone>,

    #[serde(rename = "mapCenter", skip_serializing_if = "Option::is_none")]
    pub map_center: Option<GeoPoint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_summary: Option<TrafficSummary>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Active flood-zone overlay details from the map front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodZone {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "riskLevel", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(rename = "floodType", skip_serializing_if = "Option::is_none")]
    pub flood_type: Option<String>,
    #[serde(rename = "floodChance", skip_serializing_if = "Option::is_none")]
    pub flood_chance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
}

impl ChatContext {
    pub fn is_safety_template(&self) -> bool {
        matches!(
            self.kind.as_deref(),
            Some("safety_evaluation") | Some("general_safety_info")
        )
    }
}

/// Build the prompt: the user message plus a `Context:` block listing only
/// the fields present.
pub fn build_prompt(message: &str, context: Option<&ChatContext>) -> String {
    let Some(context) = context else {
        return message.to_string();
    };

    let mut info: Vec<String> = Vec::new();

    if let Some(address) = &context.address {
        info.push(format!(
            "The user has selected or is viewing the address: {}",
            address
        ));
    }

    if let Some(location) = &context.location {
        let coord_text = format!("coordinates {}, {}", location.lat, location.lng);
        if context.address.is_some() {
            info.push(format!("The location is at {}", coord_text));
        } else {
            info.push(format!(
                "The user is currently viewing a location on the map at {}",
                coord_text
            ));
        }
    }

    if let Some(zone) = &context.flood_zone {
        let title = zone
            .title
            .as_deref()
            .or(zone.name.as_deref())
            .unwrap_or("flood zone");
        let name = zone.name.as_deref().unwrap_or("unknown");
        let mut zone_info = format!("This location is in a {} ({}).", title, name);
        zone_info.push_str(&format!(
            " Risk Level: {}. ",
            zone.risk_level.as_deref().unwrap_or("Unknown")
        ));
        zone_info.push_str(&format!(
            "Flood Type: {} with {} chance.",
            zone.flood_type.as_deref().unwrap_or("Unknown"),
            zone.flood_chance.as_deref().unwrap_or("Unknown")
        ));
        if let Some(insurance) = &zone.insurance {
            zone_info.push_str(&format!(" {}", insurance));
        }
        info.push(zone_info);
    }

    if let Some(center) = &context.map_center {
        info.push(format!(
            "The map center is at {}, {}.",
            center.lat, center.lng
        ));
    }

    if info.is_empty() {
        return message.to_string();
    }

    let mut parts = vec![message.to_string(), "\n\nContext:".to_string()];
    parts.push(
        info.iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_message_without_context() {
        assert_eq!(build_prompt("hello", None), "hello");
    }

    #[test]
    fn empty_context_omits_block() {
        let ctx = ChatContext::default();
        assert_eq!(build_prompt("hello", Some(&ctx)), "hello");
    }

    #[test]
    fn includes_address_and_location() {
        let ctx = ChatContext {
            address: Some("123 Shoreline Blvd".into()),
            location: Some(GeoPoint {
                lat: 27.8,
                lng: -97.39,
            }),
            ..Default::default()
        };
        let prompt = build_prompt("is this area safe?", Some(&ctx));
        assert!(prompt.starts_with("is this area safe?"));
        assert!(prompt.contains("Context:"));
        assert!(prompt.contains("123 Shoreline Blvd"));
        assert!(prompt.contains("The location is at coordinates 27.8, -97.39"));
    }

    #[test]
    fn location_without_address_uses_map_phrasing() {
        let ctx = ChatContext {
            location: Some(GeoPoint {
                lat: 27.8,
                lng: -97.39,
            }),
            ..Default::default()
        };
        let prompt = build_prompt("q", Some(&ctx));
        assert!(prompt.contains("currently viewing a location on the map"));
    }

    #[test]
    fn includes_flood_zone_details() {
        let ctx = ChatContext {
            flood_zone: Some(FloodZone {
                name: Some("AE".into()),
                title: Some("High Risk Flood Zone".into()),
                risk_level: Some("High".into()),
                flood_type: Some("Coastal".into()),
                flood_chance: Some("1% annual".into()),
                insurance: Some("Flood insurance required.".into()),
            }),
            ..Default::default()
        };
        let prompt = build_prompt("q", Some(&ctx));
        assert!(prompt.contains("High Risk Flood Zone (AE)"));
        assert!(prompt.contains("Risk Level: High"));
        assert!(prompt.contains("Flood Type: Coastal with 1% annual chance."));
        assert!(prompt.contains("Flood insurance required."));
    }

    #[test]
    fn parses_frontend_context_json() {
        let ctx: ChatContext = serde_json::from_str(
            r#"{
                "type": "safety_evaluation",
                "mapCenter": {"lat": 27.8, "lng": -97.4},
                "floodZone": {"name": "VE", "riskLevel": "Severe"}
            }"#,
        )
        .unwrap();
        assert!(ctx.is_safety_template());
        assert_eq!(ctx.flood_zone.unwrap().risk_level.unwrap(), "Severe");
        assert_eq!(ctx.map_center.unwrap().lat, 27.8);
    }
}
