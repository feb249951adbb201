//! Row / ResultSet
//!
//! 쿼리 결과 행과 페이징

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::cql::message::{ColumnSpec, RowsPage};
use crate::cql::CqlValue;

use super::error::{DriverError, DriverResult};
use super::session::Session;
use super::statement::Statement;

// ============================================================================
// Row - 단일 행
// ============================================================================

/// 쿼리 결과 행
///
/// 컬럼 이름에서 값으로의 매핑입니다.
#[derive(Debug, Clone)]
pub struct Row {
    /// 컬럼 이름
    keys: Vec<String>,
    /// 값들
    values: Vec<CqlValue>,
    /// 이름-인덱스 매핑
    key_index: HashMap<String, usize>,
}

impl Row {
    /// 새 행 생성
    pub fn new(keys: Vec<String>, values: Vec<CqlValue>) -> Self {
        let key_index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();

        Self {
            keys,
            values,
            key_index,
        }
    }

    /// 컬럼 이름 목록
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 값 목록
    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    /// 행 길이
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 빈 행 여부
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 이름으로 값 가져오기
    pub fn get(&self, key: &str) -> Option<&CqlValue> {
        self.key_index.get(key).and_then(|&i| self.values.get(i))
    }

    /// 인덱스로 값 가져오기
    pub fn get_by_index(&self, index: usize) -> Option<&CqlValue> {
        self.values.get(index)
    }

    /// 이름 존재 여부
    pub fn contains_key(&self, key: &str) -> bool {
        self.key_index.contains_key(key)
    }

    /// 이름으로 타입 변환된 값 가져오기
    pub fn get_as<T>(&self, key: &str) -> DriverResult<T>
    where
        T: TryFrom<CqlValue, Error = DriverError>,
    {
        self.get(key)
            .cloned()
            .ok_or_else(|| DriverError::session(format!("column '{}' not found", key)))
            .and_then(T::try_from)
    }

    /// Boolean 값 가져오기
    pub fn get_bool(&self, key: &str) -> DriverResult<bool> {
        self.get_as(key)
    }

    /// Int 값 가져오기
    pub fn get_int(&self, key: &str) -> DriverResult<i32> {
        self.get_as(key)
    }

    /// BigInt 값 가져오기
    pub fn get_bigint(&self, key: &str) -> DriverResult<i64> {
        self.get_as(key)
    }

    /// Double 값 가져오기
    pub fn get_double(&self, key: &str) -> DriverResult<f64> {
        self.get_as(key)
    }

    /// 문자열 값 가져오기
    pub fn get_text(&self, key: &str) -> DriverResult<String> {
        self.get_as(key)
    }

    /// UUID 값 가져오기
    pub fn get_uuid(&self, key: &str) -> DriverResult<uuid::Uuid> {
        self.get_as(key)
    }

    /// Optional 값 가져오기 (Null은 None)
    pub fn get_optional<T>(&self, key: &str) -> DriverResult<Option<T>>
    where
        T: TryFrom<CqlValue, Error = DriverError>,
    {
        match self.get(key) {
            Some(CqlValue::Null) | None => Ok(None),
            Some(value) => T::try_from(value.clone()).map(Some),
        }
    }

    /// Map으로 변환
    pub fn to_map(&self) -> HashMap<String, CqlValue> {
        self.keys
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .keys
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}

// 타입 변환

macro_rules! impl_try_from_value {
    ($target:ty, $accessor:ident, $expected:expr) => {
        impl TryFrom<CqlValue> for $target {
            type Error = DriverError;

            fn try_from(value: CqlValue) -> DriverResult<Self> {
                value.$accessor().ok_or_else(|| {
                    DriverError::session(format!(
                        "expected {}, found {}",
                        $expected,
                        value.type_name()
                    ))
                })
            }
        }
    };
}

impl_try_from_value!(bool, as_bool, "boolean");
impl_try_from_value!(i32, as_int, "int");
impl_try_from_value!(i64, as_bigint, "bigint");
impl_try_from_value!(f64, as_double, "double");
impl_try_from_value!(uuid::Uuid, as_uuid, "uuid");

impl TryFrom<CqlValue> for String {
    type Error = DriverError;

    fn try_from(value: CqlValue) -> DriverResult<Self> {
        match value {
            CqlValue::Text(s) | CqlValue::Ascii(s) => Ok(s),
            other => Err(DriverError::session(format!(
                "expected text, found {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<CqlValue> for Vec<u8> {
    type Error = DriverError;

    fn try_from(value: CqlValue) -> DriverResult<Self> {
        match value {
            CqlValue::Blob(b) => Ok(b),
            other => Err(DriverError::session(format!(
                "expected blob, found {}",
                other.type_name()
            ))),
        }
    }
}

// ============================================================================
// ResultSet - 결과 집합
// ============================================================================

/// 쿼리 결과 집합
///
/// 하나의 응답 페이지에 해당합니다. 페이징 상태가 있으면 다음 페이지가
/// 존재합니다.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    paging_state: Option<Vec<u8>>,
    tracing_id: Option<uuid::Uuid>,
    warnings: Vec<String>,
}

impl ResultSet {
    /// 행 페이지에서 결과 집합 생성
    pub(crate) fn from_page(
        page: RowsPage,
        tracing_id: Option<uuid::Uuid>,
        warnings: Vec<String>,
    ) -> Self {
        let keys: Vec<String> = page.columns.iter().map(|c| c.name.clone()).collect();
        let rows = page
            .rows
            .into_iter()
            .map(|cells| Row::new(keys.clone(), cells))
            .collect();

        Self {
            columns: page.columns,
            rows,
            paging_state: page.paging_state,
            tracing_id,
            warnings,
        }
    }

    /// 빈 결과 집합 생성 (VOID/SET_KEYSPACE 응답)
    pub(crate) fn empty(tracing_id: Option<uuid::Uuid>, warnings: Vec<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            paging_state: None,
            tracing_id,
            warnings,
        }
    }

    /// 컬럼 사양
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// 컬럼 이름 목록
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// 행 목록
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// 행 수
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 빈 결과 여부
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 첫 번째 행 가져오기
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// 단일 행 가져오기 (정확히 1개)
    pub fn single(mut self) -> DriverResult<Row> {
        if self.rows.len() != 1 {
            return Err(DriverError::session(format!(
                "expected a single row, got {}",
                self.rows.len()
            )));
        }
        Ok(self.rows.remove(0))
    }

    /// 다음 페이지 토큰
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    /// 다른 페이지와 병합 (행 이어붙이기)
    pub(crate) fn merged_with(mut self, mut other: ResultSet) -> ResultSet {
        if self.columns.is_empty() {
            self.columns = std::mem::take(&mut other.columns);
        }
        self.rows.append(&mut other.rows);
        self.paging_state = other.paging_state;
        self.warnings.append(&mut other.warnings);
        self
    }

    /// 페이징 상태 제거 (전체 수집 후)
    pub(crate) fn clear_paging_state(&mut self) {
        self.paging_state = None;
    }

    /// 추적 세션 id
    pub fn tracing_id(&self) -> Option<uuid::Uuid> {
        self.tracing_id
    }

    /// 코디네이터 경고
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

// ============================================================================
// Pager - 지연 페이지 시퀀스
// ============================================================================

/// 지연 페이지 시퀀스
///
/// 페이지 단위로 결과를 가져오는 재시작 가능한 유한 시퀀스입니다.
/// [`rewind`](Self::rewind)로 처음부터 다시 돌 수 있습니다.
pub struct Pager {
    session: Session,
    statement: Statement,
    values: Vec<CqlValue>,
    paging_state: Option<Vec<u8>>,
    started: bool,
    done: bool,
}

impl Pager {
    pub(crate) fn new(session: Session, statement: Statement, values: Vec<CqlValue>) -> Self {
        Self {
            session,
            statement,
            values,
            paging_state: None,
            started: false,
            done: false,
        }
    }

    /// 다음 페이지 가져오기
    ///
    /// 시퀀스 끝에서는 `Ok(None)`을 반환합니다.
    pub async fn next_page(&mut self) -> DriverResult<Option<ResultSet>> {
        if self.done {
            return Ok(None);
        }

        let result = self
            .session
            .execute_page(&self.statement, &self.values, self.paging_state.clone())
            .await?;

        self.started = true;
        self.paging_state = result.paging_state().map(|s| s.to_vec());
        if self.paging_state.is_none() {
            self.done = true;
        }
        Ok(Some(result))
    }

    /// 처음으로 되감기
    pub fn rewind(&mut self) {
        self.paging_state = None;
        self.started = false;
        self.done = false;
    }

    /// 시퀀스가 끝났는지 확인
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 모든 남은 행 수집
    pub async fn try_collect(mut self) -> DriverResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(page) = self.next_page().await? {
            rows.extend(page);
        }
        Ok(rows)
    }

    /// 행 스트림으로 변환
    ///
    /// 백그라운드 태스크가 페이지를 따라가며 채널로 행을 전달합니다.
    pub fn into_stream(mut self, buffer: usize) -> RowStream {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        tokio::spawn(async move {
            loop {
                match self.next_page().await {
                    Ok(Some(page)) => {
                        for row in page {
                            if tx.send(Ok(row)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        RowStream::from_channel(rx)
    }
}

impl fmt::Debug for Pager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pager")
            .field("statement", &self.statement.cql())
            .field("started", &self.started)
            .field("done", &self.done)
            .finish()
    }
}

// ============================================================================
// RowStream - 비동기 행 스트림
// ============================================================================

/// 비동기 행 스트림
///
/// `tokio-stream` 기반 비동기 반복자입니다. `Stream` 트레이트를 구현하여
/// async/await와 함께 사용할 수 있습니다.
pub struct RowStream {
    inner: Pin<Box<dyn Stream<Item = DriverResult<Row>> + Send>>,
}

impl RowStream {
    /// mpsc 채널에서 생성
    pub(crate) fn from_channel(rx: mpsc::Receiver<DriverResult<Row>>) -> Self {
        Self {
            inner: Box::pin(ReceiverStream::new(rx)),
        }
    }

    /// 빈 스트림 생성
    pub fn empty() -> Self {
        Self {
            inner: Box::pin(tokio_stream::empty()),
        }
    }

    /// 모든 행 수집 (에러 포함)
    pub async fn try_collect(self) -> DriverResult<Vec<Row>> {
        use tokio_stream::StreamExt;

        let mut rows = Vec::new();
        let mut stream = self.inner;
        while let Some(result) = stream.next().await {
            rows.push(result?);
        }
        Ok(rows)
    }

    /// 첫 번째 행
    pub async fn first(self) -> Option<Row> {
        use tokio_stream::StreamExt;

        let mut stream = self.inner;
        while let Some(result) = stream.next().await {
            if let Ok(row) = result {
                return Some(row);
            }
        }
        None
    }
}

impl Stream for RowStream {
    type Item = DriverResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream").finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
