//! Traffic context from OpenStreetMap's Overpass API.
//!
//! No API key required. Road density around the city center stands in for
//! live congestion data: major roads become "busy areas" and construction
//! tags become a delay count. Errors bubble up so the caller can omit the
//! traffic context block.

use coastal_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Busy-area names reported at most.
const MAX_BUSY_AREAS: usize = 5;

/// Traffic summary injected into the chatbot context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficSummary {
    /// Names of the busiest corridors (major roads) near the center.
    pub busy_areas: Vec<String>,
    /// Active construction sites in the area.
    pub construction_sites: usize,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Client for the Overpass API.
pub struct TrafficClient {
    client: Client,
    overpass_url: String,
}

impl TrafficClient {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OVERPASS_URL)
    }

    pub fn with_url(overpass_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            overpass_url: overpass_url.to_string(),
        }
    }

    /// Summarize traffic around a point: major-road names plus active
    /// construction count.
    pub async fn summary(&self, lat: f64, lng: f64, radius_km: f64) -> Result<TrafficSummary> {
        let bbox = bounding_box(lat, lng, radius_km);

        let roads_query = format!(
            "[out:json][timeout:25];(way[\"highway\"~\"^(motorway|trunk|primary|secondary|tertiary)$\"]({bbox}););out body;"
        );
        let roads = self.run_query(&roads_query).await?;
        let busy_areas = busy_areas_from(&roads);

        let construction_query = format!(
            "[out:json][timeout:25];(way[\"highway\"=\"construction\"]({bbox});way[\"construction\"~\".\"][\"highway\"~\".\"]({bbox});node[\"highway\"=\"construction\"]({bbox});node[\"barrier\"=\"construction\"]({bbox}););out center;"
        );
        let construction_sites = match self.run_query(&construction_query).await {
            Ok(response) => count_construction(&response),
            // Road data alone is still a usable summary
            Err(_) => 0,
        };

        Ok(TrafficSummary {
            busy_areas,
            construction_sites,
        })
    }

    async fn run_query(&self, query: &str) -> Result<OverpassResponse> {
        let response = self
            .client
            .post(&self.overpass_url)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|e| Error::External(format!("Overpass request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Overpass API returned {}",
                response.status()
            )));
        }
        response
            .json::<OverpassResponse>()
            .await
            .map_err(|e| Error::External(format!("Overpass response parse failed: {}", e)))
    }
}

impl Default for TrafficClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounding box around a point, `radius_km` in each direction.
fn bounding_box(lat: f64, lng: f64, radius_km: f64) -> String {
    let lat_offset = radius_km / 111.0;
    let lng_offset = radius_km / (111.0 * lat.to_radians().cos());
    format!(
        "{},{},{},{}",
        lat - lat_offset,
        lng - lng_offset,
        lat + lat_offset,
        lng + lng_offset
    )
}

/// Distinct names of the largest road classes present, biggest first.
fn busy_areas_from(response: &OverpassResponse) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for class in ["motorway", "trunk", "primary", "secondary"] {
        for element in &response.elements {
            if element.kind != "way" {
                continue;
            }
            if element.tags.get("highway").map(String::as_str) != Some(class) {
                continue;
            }
            let Some(name) = element
                .tags
                .get("name")
                .or_else(|| element.tags.get("ref"))
            else {
                continue;
            };
            if !names.contains(name) {
                names.push(name.clone());
            }
            if names.len() >= MAX_BUSY_AREAS {
                return names;
            }
        }
    }
    names
}

fn count_construction(response: &OverpassResponse) -> usize {
    response
        .elements
        .iter()
        .filter(|e| {
            e.tags.get("highway").map(String::as_str) == Some("construction")
                || e.tags.contains_key("construction")
                || e.tags.get("barrier").map(String::as_str) == Some("construction")
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(highway: &str, name: Option<&str>) -> OverpassElement {
        let mut tags = BTreeMap::new();
        tags.insert("highway".into(), highway.into());
        if let Some(name) = name {
            tags.insert("name".into(), name.into());
        }
        OverpassElement {
            kind: "way".into(),
            tags,
        }
    }

    #[test]
    fn busy_areas_prefer_major_roads() {
        let response = OverpassResponse {
            elements: vec![
                way("secondary", Some("Alameda St")),
                way("motorway", Some("I-37")),
                way("primary", Some("SPID")),
                way("residential", Some("Quiet Ln")),
            ],
        };
        let areas = busy_areas_from(&response);
        assert_eq!(areas, vec!["I-37", "SPID", "Alameda St"]);
    }

    #[test]
    fn busy_areas_deduplicate_and_cap() {
        let mut elements = Vec::new();
        for i in 0..10 {
            elements.push(way("primary", Some(&format!("Road {}", i))));
        }
        elements.push(way("primary", Some("Road 0")));
        let areas = busy_areas_from(&OverpassResponse { elements });
        assert_eq!(areas.len(), MAX_BUSY_AREAS);
    }

    #[test]
    fn unnamed_roads_are_skipped() {
        let response = OverpassResponse {
            elements: vec![way("motorway", None)],
        };
        assert!(busy_areas_from(&response).is_empty());
    }

    #[test]
    fn counts_construction_tags() {
        let mut barrier_tags = BTreeMap::new();
        barrier_tags.insert("barrier".to_string(), "construction".to_string());
        let response = OverpassResponse {
            elements: vec![
                way("construction", Some("Ocean Dr")),
                OverpassElement {
                    kind: "node".into(),
                    tags: barrier_tags,
                },
                way("primary", Some("Normal Rd")),
            ],
        };
        assert_eq!(count_construction(&response), 2);
    }

    #[test]
    fn bounding_box_centers_on_point() {
        let bbox = bounding_box(27.8006, -97.3964, 5.0);
        let parts: Vec<f64> = bbox.split(',').map(|p| p.parse().unwrap()).collect();
        assert!(parts[0] < 27.8006 && parts[2] > 27.8006);
        assert!(parts[1] < -97.3964 && parts[3] > -97.3964);
    }

    #[test]
    fn overpass_response_parses() {
        let json = r#"{"elements":[{"type":"way","id":1,"tags":{"highway":"primary","name":"SPID"}}]}"#;
        let response: OverpassResponse = serde_json::from_str(json).unwrap();
        assert_eq!(busy_areas_from(&response), vec!["SPID"]);
    }
}
