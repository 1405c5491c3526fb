//! Job: the unit of queued work.
//!
//! A job only carries ids. The prompts themselves live in the blob store so
//! queue entries stay small.

use serde::{Deserialize, Serialize};

use super::actor::ActorId;
use super::ids::{BlobId, JobId};

/// A job as submitted by a caller (the queue assigns the id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub actor_id: ActorId,
    pub system_prompt_blob_id: BlobId,
    pub user_prompt_blob_id: BlobId,
}

/// A job as queued and delivered. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub actor_id: ActorId,
    pub system_prompt_blob_id: BlobId,
    pub user_prompt_blob_id: BlobId,
}

impl Job {
    pub fn new(job_id: JobId, new_job: NewJob) -> Self {
        let NewJob {
            actor_id,
            system_prompt_blob_id,
            user_prompt_blob_id,
        } = new_job;
        Self {
            job_id,
            actor_id,
            system_prompt_blob_id,
            user_prompt_blob_id,
        }
    }
}
