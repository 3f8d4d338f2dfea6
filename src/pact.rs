//! Pact document construction and persistence.
//!
//! The mock service records every non-administrative request it serves and
//! writes the session out as a pact file during graceful shutdown. Documents
//! follow the pact specification JSON shape: consumer and provider blocks,
//! an interaction list, and a `pactSpecification` metadata stanza.
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::{
    descriptor::{ServiceDescriptor, SpecVersion, WriteMode},
    error::PactError,
    fsio,
};

/// Consumer or provider block of a pact document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Participant name as given on the command line.
    pub name: String,
}

/// Request half of a recorded interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    /// Lowercased request method.
    pub method: String,
    /// Request path without the query string.
    pub path: String,
    /// Raw query string, omitted when the request had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Response half of a recorded interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    /// Status code served.
    pub status: u16,
}

/// One recorded request/response pair.
///
/// Descriptions identify interactions: recording a request with a
/// description already in the session replaces the earlier entry, and the
/// merge write mode matches on descriptions the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// `METHOD path?query` of the request (query omitted when absent),
    /// used as the interaction identity.
    pub description: String,
    pub request: InteractionRequest,
    pub response: InteractionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactSpecification {
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "pactSpecification")]
    pub pact_specification: PactSpecification,
}

/// A complete pact document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PactFile {
    pub consumer: Participant,
    pub provider: Participant,
    pub interactions: Vec<Interaction>,
    pub metadata: Metadata,
}

/// Accumulates the interactions served during one mock service run.
#[derive(Debug)]
pub struct PactSession {
    consumer: Option<String>,
    provider: Option<String>,
    pact_dir: Option<PathBuf>,
    write_mode: WriteMode,
    spec_version: SpecVersion,
    interactions: Vec<Interaction>,
}

impl PactSession {
    /// A session recording for the given service.
    pub fn new(descriptor: &ServiceDescriptor) -> Self {
        Self {
            consumer: descriptor.consumer.clone(),
            provider: descriptor.provider.clone(),
            pact_dir: descriptor.pact_dir.clone(),
            write_mode: descriptor.write_mode,
            spec_version: descriptor.spec_version,
            interactions: Vec::new(),
        }
    }

    /// Records one served request, replacing any earlier interaction with
    /// the same description. The query is part of the description, so the
    /// same path under different queries records distinct interactions.
    pub fn record(&mut self, method: &str, path: &str, query: Option<&str>, status: u16) {
        let description = interaction_description(method, path, query);
        let interaction = Interaction {
            description: description.clone(),
            request: InteractionRequest {
                method: method.to_lowercase(),
                path: path.to_string(),
                query: query.map(str::to_string),
            },
            response: InteractionResponse { status },
        };
        match self
            .interactions
            .iter_mut()
            .find(|existing| existing.description == description)
        {
            Some(slot) => *slot = interaction,
            None => self.interactions.push(interaction),
        }
        trace!(%description, status, "recorded interaction");
    }

    /// Number of distinct interactions recorded so far.
    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    /// Where the pact will be written, or `None` if the session is not
    /// configured for persistence.
    pub fn target(&self) -> Option<PathBuf> {
        match (&self.consumer, &self.provider, &self.pact_dir) {
            (Some(consumer), Some(provider), Some(dir)) => {
                Some(dir.join(pact_filename(consumer, provider)))
            }
            _ => None,
        }
    }

    /// Writes the session out as a pact file.
    ///
    /// Returns `Ok(None)` without touching the filesystem unless consumer,
    /// provider and pact directory are all configured. In merge mode an
    /// existing document's interactions are kept, with recorded ones
    /// replacing entries of the same description.
    pub fn persist(&self) -> Result<Option<PathBuf>, PactError> {
        let (consumer, provider, path) = match (&self.consumer, &self.provider, self.target()) {
            (Some(consumer), Some(provider), Some(path)) => (consumer, provider, path),
            _ => {
                debug!("pact not written, consumer, provider and pact dir are not all configured");
                return Ok(None);
            }
        };

        let mut document = PactFile {
            consumer: Participant {
                name: consumer.clone(),
            },
            provider: Participant {
                name: provider.clone(),
            },
            interactions: self.interactions.clone(),
            metadata: Metadata {
                pact_specification: PactSpecification {
                    version: self.spec_version.document_version().to_string(),
                },
            },
        };

        if self.write_mode == WriteMode::Merge && path.exists() {
            let bytes = fs::read(&path).map_err(|source| PactError::Read {
                path: path.clone(),
                source,
            })?;
            let existing: PactFile =
                serde_json::from_slice(&bytes).map_err(|source| PactError::Merge {
                    path: path.clone(),
                    source,
                })?;
            document.interactions = merge_interactions(existing.interactions, document.interactions);
        }

        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');
        fsio::write_atomic(&path, &bytes).map_err(|source| PactError::Write {
            path: path.clone(),
            source,
        })?;
        info!(
            path = %path.display(),
            interactions = document.interactions.len(),
            "wrote pact file"
        );
        Ok(Some(path))
    }
}

fn interaction_description(method: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{method} {path}?{query}"),
        _ => format!("{method} {path}"),
    }
}

fn merge_interactions(existing: Vec<Interaction>, recorded: Vec<Interaction>) -> Vec<Interaction> {
    let mut merged = existing;
    for interaction in recorded {
        match merged
            .iter_mut()
            .find(|candidate| candidate.description == interaction.description)
        {
            Some(slot) => *slot = interaction,
            None => merged.push(interaction),
        }
    }
    merged
}

/// `{consumer}-{provider}.json`, lowercased with whitespace runs collapsed
/// to underscores.
pub fn pact_filename(consumer: &str, provider: &str) -> String {
    format!(
        "{}-{}.json",
        filename_fragment(consumer),
        filename_fragment(provider)
    )
}

fn filename_fragment(name: &str) -> String {
    let mut fragment = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                fragment.push('_');
            }
            in_whitespace = true;
        } else {
            fragment.extend(ch.to_lowercase());
            in_whitespace = false;
        }
    }
    fragment
}
