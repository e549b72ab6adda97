// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Curation Collective
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::SimilarityConfig;

/// Errors from the similarity-check service
#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("similarity service transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("similarity service returned status {0}")]
    Status(u16),

    #[error("malformed similarity response: {0}")]
    Decode(String),
}

/// Opaque handle for a submitted similarity job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobToken(pub String);

impl std::fmt::Display for JobToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One poll's worth of progress on a similarity job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// The service has not finished scoring yet
    Pending,
    /// Final uniqueness score in percent
    Score(f64),
}

/// Submit/poll protocol against the external similarity service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SimilarityChecker: Send + Sync {
    /// Submit text for scoring and obtain a job token
    async fn submit(&self, text: &str) -> Result<JobToken, SimilarityError>;

    /// Poll a previously submitted job
    async fn poll(&self, token: &JobToken) -> Result<PollOutcome, SimilarityError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    text_uid: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    text_unique: String,
}

/// HTTP client for the similarity service's form-encoded API.
pub struct HttpSimilarityChecker {
    http: reqwest::Client,
    config: SimilarityConfig,
}

impl HttpSimilarityChecker {
    /// Create a checker against the configured endpoint
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SimilarityChecker for HttpSimilarityChecker {
    async fn submit(&self, text: &str) -> Result<JobToken, SimilarityError> {
        let excluded = self.config.excluded_domains.join(",");
        let form = [
            ("text", text),
            ("userkey", self.config.api_key.as_str()),
            ("exceptdomain", excluded.as_str()),
            ("visible", "vis_on"),
        ];
        let response = self
            .http
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SimilarityError::Status(response.status().as_u16()));
        }
        let body: SubmitResponse = response.json().await?;
        if body.text_uid.is_empty() {
            return Err(SimilarityError::Decode(
                "submit response carried no job token".to_string(),
            ));
        }
        debug!("similarity job {} submitted", body.text_uid);
        Ok(JobToken(body.text_uid))
    }

    async fn poll(&self, token: &JobToken) -> Result<PollOutcome, SimilarityError> {
        let form = [
            ("uid", token.0.as_str()),
            ("userkey", self.config.api_key.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SimilarityError::Status(response.status().as_u16()));
        }
        let body: PollResponse = response.json().await?;
        if body.text_unique.is_empty() {
            return Ok(PollOutcome::Pending);
        }
        let score: f64 = body
            .text_unique
            .parse()
            .map_err(|_| SimilarityError::Decode(format!("bad score '{}'", body.text_unique)))?;
        Ok(PollOutcome::Score(score))
    }
}

/// Create an HTTP-backed similarity checker
pub fn create_similarity_checker(config: SimilarityConfig) -> std::sync::Arc<dyn SimilarityChecker> {
    std::sync::Arc::new(HttpSimilarityChecker::new(config))
}
