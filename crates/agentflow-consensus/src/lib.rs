//! Consensus voting: fan a prompt out to several models, score the answers,
//! and pick a winner deterministically.

pub mod engine;
pub mod judge;
pub mod scoring;
pub mod types;

pub use engine::ConsensusEngine;
pub use types::{
    Candidate, Evaluation, ProsCons, Rating, ScoredCandidate, TaskType, VoteRequest, VoteResponse,
    VotingMethod,
};
