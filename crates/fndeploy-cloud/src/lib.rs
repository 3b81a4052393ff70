//! Cloud Functions v1 client for fndeploy.
//!
//! # Deploy flow
//!
//! ```text
//! deploy_from_local_source
//!   1. Archive     ── fndeploy_build::build_archive → $TMPDIR/cfsrc-*.zip
//!   2. Upload URL  ── POST {parent}/functions:generateUploadUrl
//!   3. Upload      ── PUT zip to the signed URL, then delete the temp file
//!   4. Lookup      ── GET {name} (404 means "new")
//!   5. Publish     ── POST {parent}/functions  or  PATCH {name}?updateMask=...
//!   6. Poll        ── GET operations/{id} until done
//! ```
//!
//! Every seam is a trait so the flow can run against mocks:
//! [`HttpExecutor`] for HTTP, [`TokenProvider`] for credentials and
//! [`GcloudExecutor`] for the gcloud CLI.

pub mod adc;
pub mod auth;
pub mod client;
pub mod gcloud;
pub mod http;
pub mod mask;
pub mod observer;
pub mod operation;
pub mod poller;
pub mod rest;

pub use adc::{AdcFileProvider, CredentialsFile};
pub use auth::{
    AuthError, DefaultTokenProvider, GcloudTokenProvider, MetadataTokenProvider,
    StaticTokenProvider, TokenProvider,
};
pub use client::{ClientConfig, CloudFunctionsClient, DeployError, DeployOptions, OperationError};
pub use gcloud::{GcloudCli, GcloudError, GcloudExecutor};
pub use http::{
    HttpError, HttpExecutor, HttpRequest, HttpResponse, Method, ReqwestExecutor, RequestBody,
};
pub use observer::{DeployObserver, NoopObserver};
pub use operation::{Operation, OperationStatus};
pub use poller::{PollError, PollPolicy, PollState, poll_operation};
pub use rest::{ApiError, RestClient};
