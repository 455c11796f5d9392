//! OpusDNS API data types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// DNSSEC state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnssecStatus {
    Disabled,
    Enabled,
    Pending,
}

/// DNS record types accepted by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    ALIAS,
    CAA,
    CNAME,
    DNSKEY,
    DS,
    MX,
    NS,
    PTR,
    SOA,
    SRV,
    SMIMEA,
    TLSA,
    TXT,
    URI,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::ALIAS => "ALIAS",
            RecordType::CAA => "CAA",
            RecordType::CNAME => "CNAME",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::DS => "DS",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::SMIMEA => "SMIMEA",
            RecordType::TLSA => "TLSA",
            RecordType::TXT => "TXT",
            RecordType::URI => "URI",
        };
        write!(f, "{}", name)
    }
}

/// A DNS zone owned by the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnssec_status: Option<DnssecStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rrsets: Vec<RRSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<DateTime<Utc>>,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dnssec_status: None,
            rrsets: Vec::new(),
            created_on: None,
            updated_on: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneListResponse {
    #[serde(default)]
    pub results: Vec<Zone>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub total_zones: u64,
    #[serde(default)]
    pub zones_by_dnssec: HashMap<DnssecStatus, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSortField {
    Name,
    CreatedOn,
    UpdatedOn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filters for listing zones
#[derive(Debug, Clone, Default)]
pub struct ListZonesOptions {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub suffix: Option<String>,
    pub dnssec_status: Option<DnssecStatus>,
    pub sort_by: Option<ZoneSortField>,
    pub sort_order: Option<SortOrder>,
}

/// Records of one name and type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSet {
    /// Name relative to the zone, `@` for the apex
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    #[serde(default)]
    pub records: Vec<RecordData>,
}

impl RRSet {
    pub fn new(name: impl Into<String>, record_type: RecordType, ttl: u32) -> Self {
        Self {
            name: name.into(),
            record_type,
            ttl,
            records: Vec::new(),
        }
    }

    pub fn with_record(mut self, rdata: impl Into<String>) -> Self {
        self.records.push(RecordData {
            rdata: rdata.into(),
            protected: None,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub rdata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Upsert,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSetOperation {
    pub op: PatchOp,
    pub rrset: RRSet,
}

impl RRSetOperation {
    pub fn upsert(rrset: RRSet) -> Self {
        Self {
            op: PatchOp::Upsert,
            rrset,
        }
    }

    pub fn remove(rrset: RRSet) -> Self {
        Self {
            op: PatchOp::Remove,
            rrset,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSetPatchRequest {
    pub ops: Vec<RRSetOperation>,
}

/// Initial records for a new zone, rdata given as plain strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSetCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    pub records: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneCreateRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rrsets: Vec<RRSetCreate>,
}

/// The rrsets endpoint answers with either a bare list or an envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RRSetListBody {
    Bare(Vec<RRSet>),
    Wrapped { rrsets: Vec<RRSet> },
}

impl From<RRSetListBody> for Vec<RRSet> {
    fn from(body: RRSetListBody) -> Self {
        match body {
            RRSetListBody::Bare(rrsets) | RRSetListBody::Wrapped { rrsets } => rrsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zone_list_response_parses() {
        let body = json!({
            "results": [
                {"name": "example.com", "dnssec_status": "enabled", "created_on": "2024-05-01T10:00:00Z"},
                {"name": "example.org"}
            ],
            "pagination": {"total_pages": 2, "current_page": 1, "has_next_page": true}
        });
        let parsed: ZoneListResponse = serde_json::from_value(body).unwrap();

        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].dnssec_status, Some(DnssecStatus::Enabled));
        assert!(parsed.results[0].created_on.is_some());
        assert!(parsed.pagination.has_next_page);
    }

    #[test]
    fn test_patch_request_wire_format() {
        let request = RRSetPatchRequest {
            ops: vec![RRSetOperation::upsert(
                RRSet::new("_acme-challenge", RecordType::TXT, 60).with_record("\"token\""),
            )],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"ops": [{"op": "upsert", "rrset": {
                "name": "_acme-challenge",
                "type": "TXT",
                "ttl": 60,
                "records": [{"rdata": "\"token\""}]
            }}]})
        );
    }

    #[test]
    fn test_rrset_list_accepts_both_shapes() {
        let bare: RRSetListBody =
            serde_json::from_value(json!([{"name": "@", "type": "A", "ttl": 300}])).unwrap();
        let wrapped: RRSetListBody = serde_json::from_value(
            json!({"rrsets": [{"name": "www", "type": "CNAME", "ttl": 300, "records": [{"rdata": "example.com."}]}]}),
        )
        .unwrap();

        assert_eq!(Vec::<RRSet>::from(bare)[0].record_type, RecordType::A);
        assert_eq!(Vec::<RRSet>::from(wrapped)[0].records[0].rdata, "example.com.");
    }
}
