//! AnkiConnect HTTP client.
//!
//! Speaks the version-6 envelope: `{action, version, params}` in,
//! `{result, error}` out. Every sync phase maps to one logical call here;
//! where AnkiConnect has no batch action (`updateNoteFields`,
//! `storeMediaFile`, `createDeck`) the `multi` action keeps it a single
//! round trip. Any non-null `error` aborts the run.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use crate::config::MediaComparison;
use crate::media::{self, Media};
use crate::note::Note;

/// What the store already has, shaped by the configured comparison mode.
#[derive(Debug, Clone)]
pub enum StoredMedia {
    /// Filename sets; membership alone decides `Stored`.
    Names {
        images: HashSet<String>,
        audios: HashSet<String>,
    },
    /// Filename to base64 content; membership plus byte equality decides.
    Content {
        images: HashMap<String, String>,
        audios: HashMap<String, String>,
    },
}

pub struct AnkiClient {
    url: String,
    client: reqwest::Client,
}

impl AnkiClient {
    pub fn new(url: &str) -> Result<AnkiClient> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(AnkiClient {
            url: url.to_string(),
            client,
        })
    }

    async fn invoke(&self, action: &str, params: Value) -> Result<Value> {
        let body = json!({
            "action": action,
            "version": 6,
            "params": params,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("AnkiConnect request '{}' failed (is Anki running?)", action))?;
        let payload: Value = resp
            .json()
            .await
            .with_context(|| format!("AnkiConnect returned a non-JSON response to '{}'", action))?;
        if let Some(err) = payload.get("error").filter(|e| !e.is_null()) {
            bail!("AnkiConnect '{}' error: {}", action, err);
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Ids of every note currently in the collection.
    pub async fn find_note_ids(&self) -> Result<HashSet<i64>> {
        let result = self
            .invoke("findNotes", json!({ "query": "deck:*" }))
            .await?;
        let ids = result
            .as_array()
            .context("findNotes: expected an array of ids")?
            .iter()
            .filter_map(|v| v.as_i64())
            .collect();
        Ok(ids)
    }

    /// Media the store already holds, in the shape the configured comparison
    /// mode needs.
    pub async fn stored_media(&self, comparison: MediaComparison) -> Result<StoredMedia> {
        let images = self.media_names(&media::image_globs()).await?;
        let audios = self.media_names(&media::audio_globs()).await?;
        match comparison {
            MediaComparison::Name => Ok(StoredMedia::Names { images, audios }),
            MediaComparison::Content => Ok(StoredMedia::Content {
                images: self.media_contents(images).await?,
                audios: self.media_contents(audios).await?,
            }),
        }
    }

    async fn media_names(&self, globs: &[String]) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for glob in globs {
            let result = self
                .invoke("getMediaFilesNames", json!({ "pattern": glob }))
                .await?;
            if let Some(list) = result.as_array() {
                names.extend(list.iter().filter_map(|v| v.as_str().map(str::to_string)));
            }
        }
        Ok(names)
    }

    async fn media_contents(&self, names: HashSet<String>) -> Result<HashMap<String, String>> {
        let ordered: Vec<String> = names.into_iter().collect();
        let actions: Vec<Value> = ordered
            .iter()
            .map(|name| {
                json!({
                    "action": "retrieveMediaFile",
                    "params": { "filename": name },
                })
            })
            .collect();
        if actions.is_empty() {
            return Ok(HashMap::new());
        }
        let result = self.invoke("multi", json!({ "actions": actions })).await?;
        let entries = result
            .as_array()
            .context("multi retrieveMediaFile: expected an array")?;
        let mut contents = HashMap::new();
        for (name, entry) in ordered.into_iter().zip(entries) {
            // retrieveMediaFile returns false for missing files.
            if let Some(data) = multi_result(entry).as_str() {
                contents.insert(name, data.to_string());
            }
        }
        Ok(contents)
    }

    pub async fn create_decks(&self, decks: &BTreeSet<String>) -> Result<()> {
        if decks.is_empty() {
            return Ok(());
        }
        let actions: Vec<Value> = decks
            .iter()
            .map(|deck| json!({ "action": "createDeck", "params": { "deck": deck } }))
            .collect();
        self.invoke("multi", json!({ "actions": actions })).await?;
        Ok(())
    }

    pub async fn delete_notes(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.invoke("deleteNotes", json!({ "notes": ids })).await?;
        Ok(())
    }

    /// Add notes in one batch. The response has one entry per requested note,
    /// in request order; `null` marks a note Anki rejected (usually a
    /// duplicate).
    pub async fn add_notes(&self, notes: &[&Note]) -> Result<Vec<Option<i64>>> {
        if notes.is_empty() {
            return Ok(Vec::new());
        }
        let payload: Vec<Value> = notes.iter().map(|n| note_params(n, false)).collect();
        let result = self.invoke("addNotes", json!({ "notes": payload })).await?;
        let ids = result
            .as_array()
            .context("addNotes: expected an array of ids")?
            .iter()
            .map(|v| v.as_i64())
            .collect();
        Ok(ids)
    }

    pub async fn update_notes(&self, notes: &[&Note]) -> Result<()> {
        if notes.is_empty() {
            return Ok(());
        }
        let actions: Vec<Value> = notes
            .iter()
            .map(|n| {
                json!({
                    "action": "updateNoteFields",
                    "params": { "note": note_params(n, true) },
                })
            })
            .collect();
        self.invoke("multi", json!({ "actions": actions })).await?;
        Ok(())
    }

    /// Move the cards of updated notes into their target decks. Updating
    /// fields never moves cards, so a note whose file changed deck would
    /// otherwise stay where it was.
    pub async fn ensure_deck(&self, notes: &[&Note]) -> Result<()> {
        let mut by_deck: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
        for note in notes {
            if let Some(id) = note.id {
                by_deck.entry(note.deck.as_str()).or_default().push(id);
            }
        }
        for (deck, ids) in by_deck {
            let info = self.invoke("notesInfo", json!({ "notes": ids })).await?;
            let cards: Vec<i64> = info
                .as_array()
                .context("notesInfo: expected an array")?
                .iter()
                .filter_map(|n| n.get("cards").and_then(|c| c.as_array()))
                .flatten()
                .filter_map(|c| c.as_i64())
                .collect();
            if !cards.is_empty() {
                self.invoke("changeDeck", json!({ "cards": cards, "deck": deck }))
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn store_media(&self, media: &[&Media]) -> Result<()> {
        if media.is_empty() {
            return Ok(());
        }
        let mut actions = Vec::with_capacity(media.len());
        for m in media {
            let data = m
                .data
                .as_ref()
                .with_context(|| format!("Media '{}' has no loaded content", m.filename))?;
            actions.push(json!({
                "action": "storeMediaFile",
                "params": { "filename": m.filename, "data": data },
            }));
        }
        self.invoke("multi", json!({ "actions": actions })).await?;
        Ok(())
    }
}

/// `multi` wraps each sub-result as `{"result": ..., "error": ...}` on newer
/// AnkiConnect versions and returns the bare value on older ones.
fn multi_result(entry: &Value) -> &Value {
    match entry.get("result") {
        Some(inner) => inner,
        None => entry,
    }
}

fn note_params(note: &Note, with_id: bool) -> Value {
    let fields: serde_json::Map<String, Value> = note
        .fields
        .iter()
        .map(|f| (f.name.clone(), Value::String(f.value.clone())))
        .collect();
    let mut params = json!({
        "modelName": note.model,
        "deckName": note.deck,
        "tags": note.tags,
        "fields": fields,
    });
    if with_id {
        if let Some(id) = note.id {
            params["id"] = json!(id);
        }
    }
    params
}
