//! Integration tests for attsync-remote
//!
//! Uses wiremock to simulate the Confluence REST API and verifies the
//! client, the attachment store adapter and page publishing end to end.

mod common;

mod test_attachments;
mod test_page;
