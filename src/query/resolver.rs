//! Named-query lookup.

use tracing::debug;

use crate::athena::{AthenaClient, NamedQuery};
use crate::error::{DatasourceError, Result};

/// Maximum identifiers accepted by one `BatchGetNamedQuery` call.
pub const BATCH_GET_LIMIT: usize = 50;

/// Resolves named queries against the service directory.
pub struct NamedQueryResolver<'a> {
    client: &'a dyn AthenaClient,
}

impl<'a> NamedQueryResolver<'a> {
    pub fn new(client: &'a dyn AthenaClient) -> Self {
        Self { client }
    }

    /// Lists every named query in a work group, in listing order.
    pub async fn list(&self, work_group: &str) -> Result<Vec<NamedQuery>> {
        let mut ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_named_queries(work_group, next_token.as_deref())
                .await?;
            ids.extend(page.ids);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        let mut queries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_GET_LIMIT) {
            queries.extend(self.client.batch_get_named_query(chunk).await?);
        }
        debug!(work_group, count = queries.len(), "Listed named queries");
        Ok(queries)
    }

    /// Finds the named query called `name` in `work_group`.
    pub async fn resolve(&self, name: &str, work_group: &str) -> Result<NamedQuery> {
        let queries = self.list(work_group).await?;
        find_match(&queries, name, work_group)
            .cloned()
            .ok_or_else(|| DatasourceError::not_found(format!("{name} in work group {work_group}")))
    }
}

/// Picks the definition matching both name and work group.
///
/// Names are not unique within a work group and listing order is not stable,
/// so the lowest identifier wins among several matches.
pub fn find_match<'q>(
    queries: &'q [NamedQuery],
    name: &str,
    work_group: &str,
) -> Option<&'q NamedQuery> {
    queries
        .iter()
        .filter(|q| q.name == name && q.work_group == work_group)
        .min_by(|a, b| a.named_query_id.cmp(&b.named_query_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athena::{MockAthenaClient, MockCall};

    #[test]
    fn test_find_match_requires_name_and_group() {
        let queries = vec![
            NamedQuery::new("1", "Q1", "SELECT 1", "other"),
            NamedQuery::new("2", "Q2", "SELECT 2", "G1"),
        ];
        assert!(find_match(&queries, "Q1", "G1").is_none());
        assert_eq!(
            find_match(&queries, "Q2", "G1").unwrap().named_query_id,
            "2"
        );
    }

    #[test]
    fn test_find_match_lowest_identifier_wins() {
        let queries = vec![
            NamedQuery::new("id-9", "Q1", "SELECT 9", "G1"),
            NamedQuery::new("id-3", "Q1", "SELECT 3", "G1"),
            NamedQuery::new("id-5", "Q1", "SELECT 5", "G1"),
        ];
        assert_eq!(
            find_match(&queries, "Q1", "G1").unwrap().named_query_id,
            "id-3"
        );
    }

    #[tokio::test]
    async fn test_list_follows_pages_and_chunks() {
        let mut client = MockAthenaClient::new().with_page_size(7);
        for i in 0..60 {
            client = client.with_named_query(NamedQuery::new(
                format!("id-{i:02}"),
                format!("Q{i}"),
                "SELECT 1",
                "G1",
            ));
        }

        let queries = NamedQueryResolver::new(&client).list("G1").await.unwrap();

        assert_eq!(queries.len(), 60);
        assert_eq!(queries[0].name, "Q0");
        assert_eq!(queries[59].name, "Q59");

        let batches: Vec<usize> = client
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::BatchGet(ids) => Some(ids.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![50, 10]);
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let client = MockAthenaClient::new()
            .with_named_query(NamedQuery::new("id-1", "Q1", "SELECT 1", "G1"));
        let err = NamedQueryResolver::new(&client)
            .resolve("missing", "G1")
            .await
            .unwrap_err();
        assert!(matches!(err, DatasourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_propagates_listing_failure() {
        let client = MockAthenaClient::new().failing_list();
        let err = NamedQueryResolver::new(&client)
            .resolve("Q1", "G1")
            .await
            .unwrap_err();
        assert!(matches!(err, DatasourceError::RemoteCall(_)));
    }
}
