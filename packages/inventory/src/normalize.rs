//! Normalization of raw CKAN payloads into table rows.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use serde_json::Value;
use url::Url;

use crate::config::{
    catalogue_dataset_link, catalogue_resource_link, registry_dataset_link,
    registry_resource_link,
};
use crate::dates::parse_timestamp;
use crate::error::{InventoryError, Result};
use crate::http::StatusProbe;
use crate::lookup::language_alias;
use crate::types::{DatasetRecord, Platform, ResourceRecord};

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static EMAIL_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.\-_]").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MAC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Ma?c)([a-z])").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MACKENZIE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bMacKenzie\b").expect("valid regex"));

/// "English title | Titre français"
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BILINGUAL_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^|]+) \| ([^|]+)").expect("valid regex"));

/// Infer a display name from an e-mail address.
///
/// # Examples
/// ```
/// use open_data_inventory::normalize::infer_name_from_email;
///
/// assert_eq!(infer_name_from_email("jane.macdonald@example.ca"), "Jane MacDonald");
/// assert_eq!(infer_name_from_email(""), "");
/// ```
pub fn infer_name_from_email(email: &str) -> String {
    if email.is_empty() {
        return String::new();
    }
    let local = email.split('@').next().unwrap_or_default().to_lowercase();
    let words: Vec<&str> = EMAIL_SEPARATORS.split(&local).collect();
    let name = title_case(&words.join(" "));
    let name = MAC_PREFIX.replace_all(&name, |caps: &Captures<'_>| {
        format!("{}{}", &caps[1], caps[2].to_uppercase())
    });
    MACKENZIE.replace_all(&name, "Mackenzie").into_owned()
}

/// Uppercase every letter that follows a non-letter, lowercase the others.
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(c);
            previous_is_letter = false;
        }
    }
    result
}

/// Keep only the first language of a `"English | Français"` title.
pub fn first_language_title(title: &str) -> String {
    BILINGUAL_TITLE.replace_all(title, "$1").into_owned()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn string_or_empty(value: &Value, key: &str) -> String {
    str_field(value, key).unwrap_or_default().to_string()
}

fn required_str(value: &Value, key: &str) -> Result<String> {
    str_field(value, key)
        .map(str::to_string)
        .ok_or_else(|| InventoryError::missing(key))
}

/// French title from a `*_translated` object, accepting machine translations.
fn french_title(translated: Option<&Value>) -> Option<String> {
    let translated = translated?;
    str_field(translated, "fr")
        .filter(|title| !title.is_empty())
        .or_else(|| str_field(translated, "fr-t-en"))
        .map(str::to_string)
}

fn maintainer_email(raw: &Value) -> Option<String> {
    ["maintainer_email", "data_steward_email", "author_email"]
        .iter()
        .filter_map(|key| str_field(raw, key))
        .find(|email| !email.trim().is_empty())
        .map(|email| email.trim().to_lowercase())
}

fn published_date(raw: &Value) -> Result<Option<String>> {
    let Some(published) = str_field(raw, "date_published").filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(published, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| parse_timestamp(published))
        .map(|date| Some(date.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .ok_or_else(|| InventoryError::invalid("date_published", published))
}

/// Build a dataset row from a `package_show` payload.
///
/// Derived compliance columns are left empty.
///
/// # Errors
/// `MissingField`/`InvalidField` when the payload lacks the id, titles,
/// metadata timestamps or organization, or carries an unreadable
/// publication date.
pub fn normalize_dataset(raw: &Value, platform: &Platform) -> Result<DatasetRecord> {
    let id = required_str(raw, "id")?;

    let translated = raw.get("title_translated");
    let title_en = translated
        .and_then(|t| str_field(t, "en"))
        .or_else(|| str_field(raw, "title"))
        .map(str::to_string)
        .ok_or_else(|| InventoryError::missing("title_translated.en"))?;
    let title_fr = french_title(translated).unwrap_or_default();

    let resource_count = raw
        .get("resources")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let num_resources = raw
        .get("num_resources")
        .and_then(Value::as_u64)
        .map_or(resource_count, |n| n as usize);

    let organization = raw
        .get("organization")
        .filter(|org| org.is_object())
        .ok_or_else(|| InventoryError::missing("organization"))?;
    let org = required_str(organization, "name")?;
    let org_title = first_language_title(&required_str(organization, "title")?);

    let frequency = match raw.get("frequency") {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) => Some(code.clone()),
        Some(other) => {
            tracing::warn!(dataset = %id, frequency = %other, "Frequency is not a string");
            None
        }
    };

    let email = maintainer_email(raw);
    let mut record = DatasetRecord {
        title_en,
        title_fr,
        published: published_date(raw)?,
        metadata_created: required_str(raw, "metadata_created")?,
        metadata_modified: required_str(raw, "metadata_modified")?,
        num_resources,
        maintainer_name: infer_name_from_email(email.as_deref().unwrap_or_default()),
        maintainer_email: email,
        collection: str_field(raw, "collection").map(str::to_string),
        frequency,
        id,
        ..Default::default()
    };

    match platform {
        Platform::Registry => {
            record.on_registry = true;
            record.registry_link = Some(registry_dataset_link(&record.id));
            record.org = Some(org);
            record.org_title = Some(org_title);
        }
        Platform::Catalogue { site_url } => {
            record.on_catalogue = true;
            record.catalogue_link = Some(catalogue_dataset_link(site_url, &record.id));
            record.catalogue_org = Some(org);
            record.catalogue_org_title = Some(org_title);
        }
    }

    Ok(record)
}

/// Nested resource payloads of a `package_show` result.
pub fn nested_resources(raw: &Value) -> &[Value] {
    raw.get("resources")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Whether `url` is a well-formed http(s) URL worth probing.
pub fn is_checkable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .unwrap_or(false)
}

/// Map a resource's `language` list through the alias table.
///
/// Anything other than a list of strings yields an empty string.
fn resource_languages(raw: &Value) -> String {
    let Some(languages) = raw.get("language").and_then(Value::as_array) else {
        return String::new();
    };
    let codes: Option<Vec<&str>> = languages
        .iter()
        .map(|code| code.as_str().map(language_alias))
        .collect();
    codes.map(|codes| codes.join("/")).unwrap_or_default()
}

/// Build a resource row from a nested resource payload.
///
/// `parent_id` fills `dataset_id` when the payload has no `package_id`. When
/// a `probe` is given and the URL is well-formed, its status is checked
/// synchronously; a failed check leaves `url_status` unset.
pub fn normalize_resource(
    raw: &Value,
    parent_id: &str,
    platform: &Platform,
    probe: Option<&dyn StatusProbe>,
) -> Result<ResourceRecord> {
    if !raw.is_object() {
        return Err(InventoryError::invalid("resource", raw));
    }

    let dataset_id = str_field(raw, "package_id")
        .filter(|id| !id.is_empty())
        .unwrap_or(parent_id)
        .to_string();

    let mut record = ResourceRecord {
        id: string_or_empty(raw, "id"),
        title_en: string_or_empty(raw, "name"),
        title_fr: french_title(raw.get("name_translated")).unwrap_or_default(),
        created: string_or_empty(raw, "created"),
        metadata_modified: string_or_empty(raw, "metadata_modified"),
        last_modified: string_or_empty(raw, "last_modified"),
        format: string_or_empty(raw, "format"),
        lang: resource_languages(raw),
        resource_type: string_or_empty(raw, "resource_type"),
        url: string_or_empty(raw, "url"),
        dataset_id,
        ..Default::default()
    };

    record.https = record.url.starts_with("https") || record.url.starts_with("file");

    if let Some(probe) = probe {
        if is_checkable_url(&record.url) {
            match probe.status_code(&record.url) {
                Ok(status) => record.url_status = status,
                Err(e) => {
                    tracing::debug!(url = %record.url, error = %e, "URL check failed");
                }
            }
        }
    }

    match platform {
        Platform::Registry => {
            record.registry_link = Some(registry_resource_link(&record.dataset_id, &record.id));
        }
        Platform::Catalogue { site_url } => {
            record.catalogue_link = Some(catalogue_resource_link(
                site_url,
                &record.dataset_id,
                &record.id,
            ));
        }
    }

    Ok(record)
}
