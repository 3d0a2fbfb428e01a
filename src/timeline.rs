use crate::model::Item;
use crate::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum TimelineDocument {
    Wrapped { timeline: Vec<Activity> },
    Bare(Vec<Activity>),
}

/// One activity row of the timeline export
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Activity {
    title: Option<ActivityTitle>,
    library: Option<ActivityLibrary>,
    journey_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityTitle {
    text: Option<String>,
    title_id: Option<String>,
}

#[derive(Deserialize)]
struct ActivityLibrary {
    key: Option<String>,
    text: Option<String>,
}

/// Collapse timeline activity rows into unique items.
///
/// The first row seen for a `titleId` wins; rows without one are dropped.
pub fn parse_items(json: &str) -> Result<Vec<Item>, Error> {
    let document: TimelineDocument =
        serde_json::from_str(json).map_err(|e| Error::Timeline(e.to_string()))?;
    let activities = match document {
        TimelineDocument::Wrapped { timeline } => timeline,
        TimelineDocument::Bare(activities) => activities,
    };

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for activity in activities {
        let Some(title) = activity.title else {
            continue;
        };
        let Some(title_id) = title.title_id.filter(|id| !id.trim().is_empty()) else {
            continue;
        };
        if !seen.insert(title_id.clone()) {
            continue;
        }

        let (library_key, library_name) = match activity.library {
            Some(library) => (library.key, library.text),
            None => (None, None),
        };
        items.push(Item {
            title: title.text.unwrap_or_else(|| title_id.clone()),
            title_id,
            library_key,
            library_name,
            journey_url: activity.journey_url,
        });
    }
    Ok(items)
}

/// Read and parse the timeline file.
pub async fn load_items(path: &Path) -> Result<Vec<Item>, Error> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Timeline(format!("{}: {e}", path.display())))?;
    parse_items(&json)
}
