//! The read path: runs document SELECTs and shapes the response
//! envelope.

use crate::{digest, Session};

use dovetail_core::{Error, FieldFilter, ObjectTree, PrimaryKeyColumnValues, Result, RowOwnership};
use dovetail_sql::{DocSelect, RowFilter};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// Reads documents for one tree.
///
/// Page reads wrap their documents in the REST envelope: `items`,
/// `links`, `limit`, `offset`, `hasMore`, `count`. With [`Reader::etag`]
/// each document additionally carries `_metadata.etag`, computed over the
/// unfiltered document so the checksum does not depend on the projection.
pub struct Reader<'a> {
    tree: &'a ObjectTree,
    filter: Option<&'a FieldFilter>,
    ownership: Option<&'a RowOwnership>,
    row_filter: Option<&'a dyn RowFilter>,
    big_ints_as_strings: bool,
    etag: bool,
    sort: Vec<(String, bool)>,
}

#[derive(Serialize)]
struct Link<'a> {
    rel: &'a str,
    href: String,
}

impl<'a> Reader<'a> {
    pub fn new(tree: &'a ObjectTree) -> Self {
        Self {
            tree,
            filter: None,
            ownership: None,
            row_filter: None,
            big_ints_as_strings: false,
            etag: false,
            sort: vec![],
        }
    }

    pub fn filter(mut self, filter: &'a FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ownership(mut self, ownership: Option<&'a RowOwnership>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn row_filter(mut self, row_filter: &'a dyn RowFilter) -> Self {
        self.row_filter = Some(row_filter);
        self
    }

    pub fn big_ints_as_strings(mut self, enabled: bool) -> Self {
        self.big_ints_as_strings = enabled;
        self
    }

    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag = enabled;
        self
    }

    /// Order pages by a root field, ahead of the stable key order.
    pub fn sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort.push((field.into(), descending));
        self
    }

    /// One page of documents in the envelope. The underlying statement
    /// fetches one row beyond `limit`; any full page reports `hasMore`
    /// and carries a `next` link.
    pub fn page(
        &self,
        session: &mut dyn Session,
        base_url: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Value> {
        let select = self.select(DocSelect::page(self.tree, limit, offset));
        let has_check = select.has_check_column();
        let sql = select.render()?;
        debug!(sql = %sql, "page");

        let mut items: Vec<Value> = vec![];
        session.query(&sql, &mut |row| {
            items.push(self.item(row, has_check)?);
            Ok(())
        })?;

        let has_more = !items.is_empty() && items.len() as u64 >= limit;
        items.truncate(limit as usize);
        let mut links = vec![Link {
            rel: "self",
            href: base_url.to_string(),
        }];
        if has_more {
            links.push(Link {
                rel: "next",
                href: format!("{base_url}?offset={}", offset + limit),
            });
        }
        Ok(json!({
            "items": items,
            "limit": limit,
            "offset": offset,
            "hasMore": has_more,
            "count": items.len(),
            "links": links,
        }))
    }

    /// The document with the given primary key, or `None` when no row
    /// matches under the active ownership.
    pub fn one(
        &self,
        session: &mut dyn Session,
        key: &PrimaryKeyColumnValues,
    ) -> Result<Option<Value>> {
        let select = self.select(DocSelect::one(self.tree, key));
        let has_check = select.has_check_column();
        let sql = select.render()?;
        debug!(sql = %sql, "fetch one");

        match session.query_one(&sql)? {
            Some(row) => Ok(Some(self.item(&row, has_check)?)),
            None => Ok(None),
        }
    }

    fn select(&self, select: DocSelect<'a>) -> DocSelect<'a> {
        let mut select = select
            .ownership(self.ownership)
            .big_ints_as_strings(self.big_ints_as_strings)
            .etag(self.etag);
        if let Some(filter) = self.filter {
            select = select.filter(filter);
        }
        if let Some(row_filter) = self.row_filter {
            select = select.row_filter(row_filter);
        }
        for (field, descending) in &self.sort {
            select = select.sort(field.clone(), *descending);
        }
        select
    }

    fn item(&self, row: &[Option<String>], has_check: bool) -> Result<Value> {
        let Some(Some(text)) = row.first() else {
            return Err(Error::database("document query returned no document column"));
        };
        let mut doc: Value = serde_json::from_str(text)?;
        if self.etag {
            let digest = if has_check {
                let Some(Some(check)) = row.get(1) else {
                    return Err(Error::database("document query returned no check column"));
                };
                let check: Value = serde_json::from_str(check)?;
                digest::digest(self.tree, &check)
            } else {
                digest::digest(self.tree, &doc)
            };
            digest::post_process_json(&mut doc, digest, &[]);
        }
        Ok(doc)
    }
}
