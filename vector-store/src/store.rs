use crate::error::{Result, VectorStoreError};
use crate::record::{EmbeddingRecord, SearchHit};
use arrow::array::{Array, FixedSizeListArray, Float32Array, Int64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchIterator, RecordBatchReader};
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::connection::Connection;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_TABLE_NAME: &str = "embeddings";

const VECTOR_COLUMN: &str = "vector";
const DISTANCE_COLUMN: &str = "_distance";

/// Extra candidates fetched beyond `limit` before ties at the cut are checked
const TIE_MARGIN: usize = 8;

/// Configuration for the vector store.
///
/// The dimension and version are explicit so that several stores with
/// different generations can live in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Name of the LanceDB table holding embedding rows
    pub table_name: String,

    /// Dimension of the embeddings
    pub embedding_dim: usize,

    /// Current index generation; rows tagged otherwise are stale
    pub rag_version: u32,
}

impl VectorStoreConfig {
    pub fn new(embedding_dim: usize, rag_version: u32) -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            embedding_dim,
            rag_version,
        }
    }
}

/// Outcome of [`VectorStore::ensure_schema`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    /// The table matches the configured dimension and version (or is empty)
    Valid,

    /// The table was schema-drifted and has been dropped and recreated empty.
    /// Every completion claim held elsewhere is now void.
    Rebuilt { reason: String },
}

impl SchemaCheck {
    pub fn is_rebuilt(&self) -> bool {
        matches!(self, SchemaCheck::Rebuilt { .. })
    }
}

/// Vector store for embedded chunks using LanceDB
pub struct VectorStore {
    connection: Connection,
    config: VectorStoreConfig,
    table: RwLock<Table>,
}

impl VectorStore {
    /// Open (or create) the store at `db_path`
    pub async fn open(db_path: &Path, config: VectorStoreConfig) -> Result<Self> {
        if config.embedding_dim == 0 {
            return Err(VectorStoreError::Initialization(
                "embedding dimension must be > 0".into(),
            ));
        }

        info!("Opening vector store at {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let uri = db_path
            .to_str()
            .ok_or_else(|| VectorStoreError::Initialization("Invalid database path".into()))?;
        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| VectorStoreError::Initialization(e.to_string()))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| VectorStoreError::Initialization(e.to_string()))?;

        let table = if table_names.contains(&config.table_name) {
            debug!("Opening existing table '{}'", config.table_name);
            connection
                .open_table(&config.table_name)
                .execute()
                .await
                .map_err(|e| VectorStoreError::Initialization(e.to_string()))?
        } else {
            debug!("Creating new table '{}'", config.table_name);
            Self::create_table(&connection, &config, CreateTableMode::Create).await?
        };

        Ok(Self {
            connection,
            config,
            table: RwLock::new(table),
        })
    }

    /// Create an empty table with the proper schema
    async fn create_table(
        connection: &Connection,
        config: &VectorStoreConfig,
        mode: CreateTableMode,
    ) -> Result<Table> {
        let schema = Arc::new(create_schema(config.embedding_dim));
        let batches = vec![RecordBatch::new_empty(schema.clone())];
        let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(
            batches.into_iter().map(Ok),
            schema,
        ));

        let table = connection
            .create_table(config.table_name.clone(), reader)
            .mode(mode)
            .execute()
            .await
            .map_err(|e| VectorStoreError::Initialization(e.to_string()))?;
        Ok(table)
    }

    async fn table(&self) -> Table {
        self.table.read().await.clone()
    }

    /// Validate the table against the configured dimension and version.
    ///
    /// An empty table is always valid. A populated table whose layout, sampled
    /// row, or any row's `rag_version` disagrees with the configuration is
    /// dropped and recreated empty.
    pub async fn ensure_schema(&self) -> Result<SchemaCheck> {
        let table = self.table().await;
        let layout_problem = self.layout_problem(&table).await?;
        let rows = table.count_rows(None).await?;

        if rows == 0 {
            if let Some(problem) = layout_problem {
                info!(
                    "Recreating empty table '{}' ({problem})",
                    self.config.table_name
                );
                self.reset().await?;
            }
            return Ok(SchemaCheck::Valid);
        }

        let drift = match layout_problem {
            Some(problem) => Some(problem),
            None => self.row_problem(&table).await?,
        };

        match drift {
            Some(reason) => {
                warn!(
                    "Table '{}' is schema-drifted ({reason}); dropping {rows} rows",
                    self.config.table_name
                );
                self.reset().await?;
                Ok(SchemaCheck::Rebuilt { reason })
            }
            None => Ok(SchemaCheck::Valid),
        }
    }

    /// Compare the declared Arrow schema with the expected one
    async fn layout_problem(&self, table: &Table) -> Result<Option<String>> {
        let actual = table.schema().await?;
        let expected = create_schema(self.config.embedding_dim);

        for field in expected.fields() {
            let Ok(existing) = actual.field_with_name(field.name()) else {
                return Ok(Some(format!("missing column '{}'", field.name())));
            };

            let matches = match (existing.data_type(), field.data_type()) {
                (DataType::FixedSizeList(actual_item, actual_len), DataType::FixedSizeList(_, len)) => {
                    actual_len == len && actual_item.data_type() == &DataType::Float32
                }
                (actual_type, expected_type) => actual_type == expected_type,
            };

            if !matches {
                return Ok(Some(format!(
                    "column '{}' is {:?}, expected {:?}",
                    field.name(),
                    existing.data_type(),
                    field.data_type()
                )));
            }
        }

        Ok(None)
    }

    /// Sample one row, then look for any row from another generation
    async fn row_problem(&self, table: &Table) -> Result<Option<String>> {
        let batches: Vec<RecordBatch> = table
            .query()
            .limit(1)
            .execute()
            .await?
            .try_collect()
            .await?;

        if let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) {
            let version = column::<UInt32Array>(batch, "rag_version")?.value(0);
            if version != self.config.rag_version {
                return Ok(Some(format!(
                    "sampled row has rag_version {version}, expected {}",
                    self.config.rag_version
                )));
            }

            let dimension = column::<FixedSizeListArray>(batch, VECTOR_COLUMN)?.value_length();
            if dimension as usize != self.config.embedding_dim {
                return Ok(Some(format!(
                    "sampled row has dimension {dimension}, expected {}",
                    self.config.embedding_dim
                )));
            }
        }

        let stale = table
            .count_rows(Some(format!(
                "rag_version <> {}",
                self.config.rag_version
            )))
            .await?;
        if stale > 0 {
            return Ok(Some(format!(
                "{stale} rows are not tagged rag_version {}",
                self.config.rag_version
            )));
        }

        Ok(None)
    }

    /// Drop every row by recreating the table empty
    pub async fn reset(&self) -> Result<()> {
        let table =
            Self::create_table(&self.connection, &self.config, CreateTableMode::Overwrite).await?;
        *self.table.write().await = table;
        Ok(())
    }

    /// Append rows in one columnar write
    pub async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let reader: Box<dyn RecordBatchReader + Send> = Box::new(RecordBatchIterator::new(
            vec![Ok(batch)].into_iter(),
            schema,
        ));

        self.table()
            .await
            .add(reader)
            .execute()
            .await
            .map_err(|e| VectorStoreError::AdditionFailed(e.to_string()))?;

        debug!("Inserted {} rows", records.len());
        Ok(())
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let dim = self.config.embedding_dim;
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dim) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dim,
                actual: bad.embedding.len(),
            });
        }

        let absolute_paths: Vec<&str> = records.iter().map(|r| r.absolute_path.as_str()).collect();
        let relative_paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
        let chunk_indexes: Vec<u32> = records.iter().map(|r| r.chunk_index).collect();
        let total_chunks: Vec<u32> = records.iter().map(|r| r.total_chunks).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let start_lines: Vec<u32> = records.iter().map(|r| r.start_line).collect();
        let end_lines: Vec<u32> = records.iter().map(|r| r.end_line).collect();
        let versions: Vec<u32> = records.iter().map(|r| r.rag_version).collect();
        let indexed_at: Vec<i64> = records.iter().map(|r| r.indexed_at).collect();

        // Flatten embeddings into a single values buffer
        let values: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();
        let vectors = FixedSizeListArray::try_new(
            Arc::new(vector_item_field()),
            dim as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )?;

        let batch = RecordBatch::try_new(
            Arc::new(create_schema(dim)),
            vec![
                Arc::new(StringArray::from(absolute_paths)),
                Arc::new(StringArray::from(relative_paths)),
                Arc::new(UInt32Array::from(chunk_indexes)),
                Arc::new(UInt32Array::from(total_chunks)),
                Arc::new(StringArray::from(contents)),
                Arc::new(vectors),
                Arc::new(UInt32Array::from(start_lines)),
                Arc::new(UInt32Array::from(end_lines)),
                Arc::new(UInt32Array::from(versions)),
                Arc::new(Int64Array::from(indexed_at)),
            ],
        )?;

        Ok(batch)
    }

    /// Delete every row of one file. Deleting an unknown path is a no-op.
    pub async fn delete_by_path(&self, relative_path: &str) -> Result<()> {
        let predicate = path_predicate(relative_path);
        self.table()
            .await
            .delete(&predicate)
            .await
            .map_err(|e| VectorStoreError::DeletionFailed(e.to_string()))?;
        debug!("Deleted rows where {predicate}");
        Ok(())
    }

    /// k-nearest-neighbour search, closest first.
    ///
    /// Fails with [`VectorStoreError::DimensionMismatch`] before touching the
    /// table when `query_vector` has the wrong length.
    pub async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if query_vector.len() != self.config.embedding_dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: query_vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.table().await;
        let total = table.count_rows(None).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        // Widen the candidate set until the k-th distance is strictly closer
        // than the farthest candidate, so ties at the cut are ordered too
        let mut fetch = limit.saturating_add(TIE_MARGIN).min(total);
        loop {
            let mut hits = Self::nearest(&table, query_vector, fetch).await?;
            sort_hits(&mut hits);

            let exhausted = hits.len() < fetch || fetch >= total;
            let settled = exhausted
                || hits
                    .get(limit - 1)
                    .zip(hits.last())
                    .is_some_and(|(kth, farthest)| kth.distance < farthest.distance);
            if settled {
                hits.truncate(limit);
                debug!("Search returned {} hits from {fetch} candidates", hits.len());
                return Ok(hits);
            }
            fetch = fetch.saturating_mul(2).min(total);
        }
    }

    async fn nearest(table: &Table, query_vector: &[f32], fetch: usize) -> Result<Vec<SearchHit>> {
        let batches: Vec<RecordBatch> = table
            .vector_search(query_vector.to_vec())
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::L2)
            .limit(fetch)
            .execute()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(batch_to_hits(batch)?);
        }
        Ok(hits)
    }

    /// Every distinct relative path that has at least one row
    pub async fn indexed_paths(&self) -> Result<BTreeSet<String>> {
        let batches: Vec<RecordBatch> = self
            .table()
            .await
            .query()
            .select(Select::columns(&["relative_path"]))
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut paths = BTreeSet::new();
        for batch in &batches {
            let column = column::<StringArray>(batch, "relative_path")?;
            for i in 0..batch.num_rows() {
                paths.insert(column.value(i).to_string());
            }
        }
        Ok(paths)
    }

    /// Get the total number of rows in the store
    pub async fn count(&self) -> Result<usize> {
        Ok(self.table().await.count_rows(None).await?)
    }

    /// Number of rows stored for one file
    pub async fn count_for_path(&self, relative_path: &str) -> Result<usize> {
        Ok(self
            .table()
            .await
            .count_rows(Some(path_predicate(relative_path)))
            .await?)
    }

    /// Get the configuration of this vector store
    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }
}

/// Escape a value for use inside a single-quoted SQL string literal
pub fn escape_predicate_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Closest first; equal distances by path, then chunk
fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
}

fn path_predicate(relative_path: &str) -> String {
    format!(
        "relative_path = '{}'",
        escape_predicate_literal(relative_path)
    )
}

fn vector_item_field() -> Field {
    Field::new("item", DataType::Float32, true)
}

/// Create the Arrow schema for the table
fn create_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        Field::new("absolute_path", DataType::Utf8, false),
        Field::new("relative_path", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("total_chunks", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(vector_item_field()), embedding_dim as i32),
            false,
        ),
        Field::new("start_line", DataType::UInt32, false),
        Field::new("end_line", DataType::UInt32, false),
        Field::new("rag_version", DataType::UInt32, false),
        Field::new("indexed_at", DataType::Int64, false),
    ])
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .ok_or_else(|| VectorStoreError::InvalidColumn(name.to_string()))
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let absolute_paths = column::<StringArray>(batch, "absolute_path")?;
    let relative_paths = column::<StringArray>(batch, "relative_path")?;
    let chunk_indexes = column::<UInt32Array>(batch, "chunk_index")?;
    let total_chunks = column::<UInt32Array>(batch, "total_chunks")?;
    let contents = column::<StringArray>(batch, "content")?;
    let start_lines = column::<UInt32Array>(batch, "start_line")?;
    let end_lines = column::<UInt32Array>(batch, "end_line")?;
    let versions = column::<UInt32Array>(batch, "rag_version")?;
    let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    Ok((0..batch.num_rows())
        .map(|i| SearchHit {
            relative_path: relative_paths.value(i).to_string(),
            absolute_path: absolute_paths.value(i).to_string(),
            chunk_index: chunk_indexes.value(i),
            total_chunks: total_chunks.value(i),
            content: contents.value(i).to_string(),
            start_line: start_lines.value(i),
            end_line: end_lines.value(i),
            rag_version: versions.value(i),
            distance: distances.value(i),
        })
        .collect())
}
