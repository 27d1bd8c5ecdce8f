//! LanceDB-backed index client.
//!
//! Dense search is LanceDB's exact cosine vector search; sparse search scans
//! the stored weights and scores them by inner product. LanceDB is async,
//! the index client contract is not: calls are driven on a runtime owned by
//! the client, so it must not be used from inside another tokio runtime.
use arrow_array::{FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, DistanceType, Table};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use legaldb_core::traits::IndexClient;
use legaldb_core::types::{sparse_inner_product, Chunk, ChunkId, IndexRecord, SearchHit, SourceKind, SparseVector};
use legaldb_core::{Error, Result};

use crate::rank_hits;
use crate::schema::chunk_schema;

const FETCH_BATCH: usize = 256;

pub struct LanceIndex {
    rt: Runtime,
    table: Table,
    dim: i32,
}

fn quote(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Operation(format!("column '{name}' missing or not utf8")))
}

impl LanceIndex {
    /// Connects to `uri` and creates `table` if it does not exist yet.
    pub fn open(uri: &str, table: &str, dim: usize) -> Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| Error::InvalidConfig(format!("vector dimension {dim} too large")))?;
        let rt = Runtime::new().map_err(Error::index)?;
        let table = rt
            .block_on(async {
                let conn = connect(uri).execute().await?;
                let names = conn.table_names().execute().await?;
                if !names.contains(&table.to_string()) {
                    // create empty table with 0 rows
                    let schema = chunk_schema(dim);
                    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
                    conn.create_table(table, Box::new(iter)).execute().await?;
                    info!(uri, table, "created chunk table");
                }
                conn.open_table(table).execute().await
            })
            .map_err(Error::index)?;
        Ok(Self { rt, table, dim })
    }

    pub fn count(&self) -> Result<usize> {
        self.rt.block_on(self.table.count_rows(None)).map_err(Error::index)
    }

    fn to_batch(&self, records: &[IndexRecord]) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(records.len());
        let mut document_ids = Vec::with_capacity(records.len());
        let mut texts = Vec::with_capacity(records.len());
        let mut chunk_json = Vec::with_capacity(records.len());
        let mut sparse_json = Vec::with_capacity(records.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(records.len());
        for r in records {
            if r.representation.dense.len() != self.dim as usize {
                return Err(Error::Operation(format!(
                    "vector for {} has {} dims, table expects {}",
                    r.chunk.id,
                    r.representation.dense.len(),
                    self.dim
                )));
            }
            ids.push(r.chunk.id.clone());
            document_ids.push(r.chunk.document_id.clone());
            texts.push(r.chunk.text.clone());
            chunk_json.push(serde_json::to_string(&r.chunk).map_err(|e| Error::Operation(e.to_string()))?);
            sparse_json.push(serde_json::to_string(&r.representation.sparse).map_err(|e| Error::Operation(e.to_string()))?);
            vectors.push(Some(r.representation.dense.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            chunk_schema(self.dim),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(chunk_json)),
                Arc::new(StringArray::from(sparse_json)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, self.dim)),
            ],
        )
        .map_err(|e| Error::Operation(e.to_string()))
    }

    fn scan(&self, filter: Option<String>, columns: &[&str]) -> Result<Vec<RecordBatch>> {
        self.rt
            .block_on(async {
                let mut query = self.table.query().select(Select::columns(columns));
                if let Some(filter) = filter {
                    query = query.only_if(filter);
                }
                query.execute().await?.try_collect::<Vec<_>>().await
            })
            .map_err(Error::index)
    }
}

impl IndexClient for LanceIndex {
    fn insert(&self, record: IndexRecord) -> Result<ChunkId> {
        Ok(self.insert_many(vec![record])?.remove(0))
    }

    /// Upserts by chunk id in one write.
    fn insert_many(&self, records: Vec<IndexRecord>) -> Result<Vec<ChunkId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.to_batch(&records)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.rt
            .block_on(async {
                let mut mi = self.table.merge_insert(&["id"]);
                mi.when_matched_update_all(None).when_not_matched_insert_all();
                mi.execute(reader).await
            })
            .map_err(Error::index)?;
        debug!(rows = records.len(), "chunks written to lance table");
        Ok(records.into_iter().map(|r| r.chunk.id).collect())
    }

    fn delete_document(&self, document_id: &str) -> Result<usize> {
        let filter = format!("document_id = {}", quote(document_id));
        let removed = self
            .rt
            .block_on(async {
                let n = self.table.count_rows(Some(filter.clone())).await?;
                if n > 0 {
                    self.table.delete(&filter).await?;
                }
                Ok::<_, lancedb::Error>(n)
            })
            .map_err(Error::index)?;
        debug!(document_id, removed, "document removed from lance table");
        Ok(removed)
    }

    fn search_dense(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if vector.len() != self.dim as usize {
            return Err(Error::Operation(format!("query vector has {} dims, table expects {}", vector.len(), self.dim)));
        }
        if top_k == 0 || self.count()? == 0 {
            return Ok(Vec::new());
        }
        let batches = self
            .rt
            .block_on(async {
                self.table
                    .vector_search(vector.to_vec())?
                    .distance_type(DistanceType::Cosine)
                    .limit(top_k)
                    .select(Select::columns(&["id"]))
                    .execute()
                    .await?
                    .try_collect::<Vec<_>>()
                    .await
            })
            .map_err(Error::index)?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| Error::Operation("vector search returned no _distance column".into()))?;
            for i in 0..batch.num_rows() {
                hits.push(SearchHit { id: ids.value(i).to_string(), score: 1.0 - distances.value(i), source: SourceKind::Dense });
            }
        }
        Ok(rank_hits(hits, top_k))
    }

    fn search_sparse(&self, weights: &SparseVector, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 || weights.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for batch in self.scan(None, &["id", "sparse_json"])? {
            let ids = string_column(&batch, "id")?;
            let sparse = string_column(&batch, "sparse_json")?;
            for i in 0..batch.num_rows() {
                let stored: SparseVector = serde_json::from_str(sparse.value(i)).map_err(|e| Error::Operation(e.to_string()))?;
                let score = sparse_inner_product(weights, &stored);
                if score > 0.0 {
                    hits.push(SearchHit { id: ids.value(i).to_string(), score, source: SourceKind::Sparse });
                }
            }
        }
        Ok(rank_hits(hits, top_k))
    }

    fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let mut found: HashMap<String, Chunk> = HashMap::with_capacity(ids.len());
        for group in ids.chunks(FETCH_BATCH) {
            let list = group.iter().map(|id| quote(id)).collect::<Vec<_>>().join(", ");
            for batch in self.scan(Some(format!("id IN ({list})")), &["id", "chunk_json"])? {
                let json = string_column(&batch, "chunk_json")?;
                for i in 0..batch.num_rows() {
                    let chunk: Chunk = serde_json::from_str(json.value(i)).map_err(|e| Error::Operation(e.to_string()))?;
                    found.insert(chunk.id.clone(), chunk);
                }
            }
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}
