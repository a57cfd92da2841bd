//! Common test fixtures for flood domain generator tests.
//!
//! Product text mirrors the layout of an NWS HML product: a WMO header,
//! one XML document per forecast site, and a `$$` trailer.

use serde_json::{json, Value};

/// WMO header preceding the first embedded document.
pub const HML_HEADER: &str = "000\nSRUS53 KMKX 011523\nHMLMKX\n\n";

/// Trailer after the last embedded document.
pub const HML_TRAILER: &str = "\n\n$$\n";

/// A well-formed site document with an observed block.
pub fn hml_site(id: &str) -> String {
    format!(
        r#"<?xml version="1.0" standalone="yes"?>
<site xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" timezone="UTC" originator="NWS: MILWAUKEE/SULLIVAN, WI" name="Test River at {id}" id="{id}" generationtime="2024-05-01T15:23:00-00:00">
  <disclaimers>
    <AHPSXMLversion>2.2</AHPSXMLversion>
    <status>PROVISIONAL</status>
    <quality>UNCHECKED</quality>
    <standing>OVERWRITE</standing>
  </disclaimers>
  <observed>
    <datum>
      <valid timezone="UTC">2024-05-01T15:00:00-00:00</valid>
      <primary name="Stage" units="ft">12.30</primary>
      <secondary name="Flow" units="kcfs">4.56</secondary>
    </datum>
    <datum>
      <valid timezone="UTC">2024-05-01T14:00:00-00:00</valid>
      <primary name="Stage" units="ft">12.10</primary>
      <secondary name="Flow" units="kcfs">-999</secondary>
    </datum>
  </observed>
  <forecast timezone="UTC" issued="2024-05-01T15:00:00-00:00">
    <datum>
      <valid timezone="UTC">2024-05-02T00:00:00-00:00</valid>
      <primary name="Stage" units="ft">13.00</primary>
    </datum>
  </forecast>
</site>"#
    )
}

/// A site document without observations.
pub fn hml_site_minimal(id: &str) -> String {
    format!(
        r#"<?xml version="1.0" standalone="yes"?>
<site id="{id}" name="Minimal {id}">
  <disclaimers>
    <AHPSXMLversion>2.2</AHPSXMLversion>
    <status>PROVISIONAL</status>
  </disclaimers>
</site>"#
    )
}

/// Assemble a product from embedded documents.
pub fn hml_product(documents: &[String]) -> String {
    let mut text = String::from(HML_HEADER);
    text.push_str(&documents.join("\n\n"));
    text.push_str(HML_TRAILER);
    text
}

/// Product JSON served at a message's reference URL.
pub fn product_json(product_text: &str) -> Value {
    json!({
        "id": "b3a1c2d4-0000-4000-8000-000000000000",
        "productCode": "HML",
        "issuanceTime": "2024-05-01T15:23:00+00:00",
        "productText": product_text,
    })
}

/// A complete gauge detail payload.
pub fn gauge_json(lid: &str, reach_id: &str, forecast_category: &str) -> Value {
    json!({
        "lid": lid,
        "usgsId": "04087000",
        "reachId": reach_id,
        "name": format!("Test River at {lid}"),
        "description": "",
        "rfc": { "abbreviation": "NCRFC", "name": "North Central River Forecast Center" },
        "wfo": { "abbreviation": "MKX", "name": "Milwaukee/Sullivan" },
        "state": { "abbreviation": "WI", "name": "Wisconsin" },
        "county": "Milwaukee",
        "timeZone": "CST6CDT",
        "latitude": 43.1,
        "longitude": -87.9,
        "pedts": { "observed": "HGIRG", "forecast": "HGIFF" },
        "status": {
            "observed": {
                "primary": 12.3,
                "primaryUnit": "ft",
                "secondary": 4.56,
                "secondaryUnit": "kcfs",
                "floodCategory": "action",
                "validTime": "2024-05-01T15:00:00Z"
            },
            "forecast": {
                "primary": 13.0,
                "primaryUnit": "ft",
                "secondary": 5.1,
                "secondaryUnit": "kcfs",
                "floodCategory": forecast_category,
                "validTime": "2024-05-02T00:00:00Z"
            }
        },
        "flood": {
            "stageUnits": "ft",
            "flowUnits": "kcfs",
            "categories": {
                "major": { "stage": 18.0, "flow": 12.0 },
                "moderate": { "stage": 16.0, "flow": 9.0 },
                "minor": { "stage": 13.0, "flow": 6.0 },
                "action": { "stage": 11.0, "flow": 4.0 }
            },
            "impacts": [
                { "stage": 13.0, "statement": "Lowland flooding begins." }
            ]
        },
        "upstreamLid": "",
        "downstreamLid": "",
        "inService": { "enabled": true, "message": "" },
        "forecastReliability": "",
        "ObservedFloodCategory": "action",
        "ForecastFloodCategory": forecast_category,
    })
}

/// Stage/flow forecast whose first entry carries `secondary`.
pub fn stageflow_json(secondary: f64) -> Value {
    json!({
        "primaryName": "Stage",
        "primaryUnits": "ft",
        "secondaryName": "Flow",
        "secondaryUnits": "kcfs",
        "data": [
            {
                "validTime": "2024-05-02T00:00:00Z",
                "generatedTime": "2024-05-01T15:00:00Z",
                "primary": 13.0,
                "secondary": secondary
            },
            {
                "validTime": "2024-05-02T06:00:00Z",
                "generatedTime": "2024-05-01T15:00:00Z",
                "primary": 13.4,
                "secondary": 5.8
            }
        ]
    })
}

/// Reach metadata with a single downstream reach.
pub fn reach_json(reach_id: &str, downstream: &str) -> Value {
    json!({
        "reachId": reach_id,
        "name": "Test River",
        "streamOrder": "4",
        "route": {
            "upstream": [],
            "downstream": [
                { "reachId": downstream, "streamOrder": "4" }
            ]
        }
    })
}
