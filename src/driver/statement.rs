//! Statement Abstractions
//!
//! 단순/준비된/배치 문장 정의

use std::fmt;
use std::time::Duration;

use crate::cql::ColumnSpec;

// ============================================================================
// Consistency - 일관성 수준
// ============================================================================

/// 일관성 수준
///
/// 순서: Any < One < Two < Three < Quorum < All
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0000,
    One = 0x0001,
    Two = 0x0002,
    Three = 0x0003,
    Quorum = 0x0004,
    All = 0x0005,
    LocalQuorum = 0x0006,
    EachQuorum = 0x0007,
    LocalOne = 0x000A,

    // SELECT 문이 Paxos 읽기를 하도록 Serial/LocalSerial도 설정 가능
    Serial = 0x0008,
    LocalSerial = 0x0009,
}

impl Consistency {
    /// 와이어 코드
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// 와이어 코드에서 파싱
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0000 => Some(Self::Any),
            0x0001 => Some(Self::One),
            0x0002 => Some(Self::Two),
            0x0003 => Some(Self::Three),
            0x0004 => Some(Self::Quorum),
            0x0005 => Some(Self::All),
            0x0006 => Some(Self::LocalQuorum),
            0x0007 => Some(Self::EachQuorum),
            0x0008 => Some(Self::Serial),
            0x0009 => Some(Self::LocalSerial),
            0x000A => Some(Self::LocalOne),
            _ => None,
        }
    }

    /// 직렬 계층 여부
    pub fn is_serial(&self) -> bool {
        matches!(self, Self::Serial | Self::LocalSerial)
    }

    /// 주어진 복제 계수에서 필요한 응답 레플리카 수
    ///
    /// 문서화된 순서의 검증 기준: A ≤ B 이면 모든 rf에 대해
    /// `required_acks(A, rf) ≤ required_acks(B, rf)`.
    pub fn required_acks(&self, replication_factor: u32) -> u32 {
        match self {
            Self::Any => 0,
            Self::One | Self::LocalOne => 1.min(replication_factor),
            Self::Two => 2.min(replication_factor),
            Self::Three => 3.min(replication_factor),
            Self::Quorum | Self::LocalQuorum | Self::EachQuorum => replication_factor / 2 + 1,
            Self::All => replication_factor,
            Self::Serial | Self::LocalSerial => replication_factor / 2 + 1,
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "ANY",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Three => "THREE",
            Self::Quorum => "QUORUM",
            Self::All => "ALL",
            Self::LocalQuorum => "LOCAL_QUORUM",
            Self::EachQuorum => "EACH_QUORUM",
            Self::Serial => "SERIAL",
            Self::LocalSerial => "LOCAL_SERIAL",
            Self::LocalOne => "LOCAL_ONE",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// SerialConsistency - 직렬 일관성
// ============================================================================

/// 조건부 문장의 직렬 일관성
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SerialConsistency {
    Serial = 0x0008,
    LocalSerial = 0x0009,
}

impl SerialConsistency {
    /// 와이어 코드
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for SerialConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "SERIAL"),
            Self::LocalSerial => write!(f, "LOCAL_SERIAL"),
        }
    }
}

// ============================================================================
// Query - 단순 문장
// ============================================================================

/// 단순 문장 (CQL 텍스트)
#[derive(Debug, Clone)]
pub struct Query {
    /// CQL 텍스트
    pub(crate) contents: String,
    consistency: Option<Consistency>,
    serial_consistency: Option<SerialConsistency>,
    page_size: Option<i32>,
    paging_state: Option<Vec<u8>>,
    request_timeout: Option<Duration>,
}

impl Query {
    /// 새 문장 생성
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            consistency: None,
            serial_consistency: None,
            page_size: None,
            paging_state: None,
            request_timeout: None,
        }
    }

    /// CQL 텍스트
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// 일관성 설정
    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = Some(consistency);
    }

    /// 직렬 일관성 설정
    pub fn set_serial_consistency(&mut self, serial: SerialConsistency) {
        self.serial_consistency = Some(serial);
    }

    /// 페이지 크기 설정
    pub fn set_page_size(&mut self, page_size: i32) {
        self.page_size = Some(page_size);
    }

    /// 페이징 상태 설정
    pub fn set_paging_state(&mut self, paging_state: Option<Vec<u8>>) {
        self.paging_state = paging_state;
    }

    /// 요청 타임아웃 설정
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = Some(timeout);
    }

    /// 일관성 (빌더 스타일)
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// 페이지 크기 (빌더 스타일)
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// 설정된 일관성
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    /// 설정된 직렬 일관성
    pub fn serial_consistency(&self) -> Option<SerialConsistency> {
        self.serial_consistency
    }

    /// 설정된 페이지 크기
    pub fn page_size(&self) -> Option<i32> {
        self.page_size
    }

    /// 설정된 페이징 상태
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    /// 설정된 요청 타임아웃
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contents)
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// PreparedStatement - 준비된 문장
// ============================================================================

/// 준비된 문장
///
/// 서버가 발급한 문장 id는 준비한 노드에서만 유효합니다. 다른 노드가
/// UNPREPARED로 응답하면 세션이 투명하게 재준비합니다.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub(crate) id: Vec<u8>,
    pub(crate) statement: String,
    pub(crate) pk_indices: Vec<u16>,
    pub(crate) bind_columns: Vec<ColumnSpec>,
    consistency: Option<Consistency>,
    serial_consistency: Option<SerialConsistency>,
    page_size: Option<i32>,
    request_timeout: Option<Duration>,
}

impl PreparedStatement {
    /// 새 준비된 문장 생성
    pub(crate) fn new(
        id: Vec<u8>,
        statement: String,
        pk_indices: Vec<u16>,
        bind_columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            id,
            statement,
            pk_indices,
            bind_columns,
            consistency: None,
            serial_consistency: None,
            page_size: None,
            request_timeout: None,
        }
    }

    /// 서버 발급 문장 id
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// 원본 CQL 텍스트
    pub fn get_statement(&self) -> &str {
        &self.statement
    }

    /// 바인드 마커의 파티션 키 인덱스
    pub fn pk_indices(&self) -> &[u16] {
        &self.pk_indices
    }

    /// 바인드 마커 컬럼 사양
    pub fn bind_columns(&self) -> &[ColumnSpec] {
        &self.bind_columns
    }

    /// 일관성 설정
    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = Some(consistency);
    }

    /// 직렬 일관성 설정
    pub fn set_serial_consistency(&mut self, serial: SerialConsistency) {
        self.serial_consistency = Some(serial);
    }

    /// 페이지 크기 설정
    pub fn set_page_size(&mut self, page_size: i32) {
        self.page_size = Some(page_size);
    }

    /// 요청 타임아웃 설정
    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = Some(timeout);
    }

    /// 설정된 일관성
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    /// 설정된 직렬 일관성
    pub fn serial_consistency(&self) -> Option<SerialConsistency> {
        self.serial_consistency
    }

    /// 설정된 페이지 크기
    pub fn page_size(&self) -> Option<i32> {
        self.page_size
    }

    /// 설정된 요청 타임아웃
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
}

impl fmt::Display for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)
    }
}

// ============================================================================
// Statement - 문장
// ============================================================================

/// 실행 가능한 문장
#[derive(Debug, Clone)]
pub enum Statement {
    /// 단순 문장
    Simple(Query),
    /// 준비된 문장
    Prepared(PreparedStatement),
}

impl Statement {
    /// CQL 텍스트
    pub fn cql(&self) -> &str {
        match self {
            Statement::Simple(query) => &query.contents,
            Statement::Prepared(prepared) => &prepared.statement,
        }
    }

    /// 문장별 일관성 오버라이드
    pub fn consistency(&self) -> Option<Consistency> {
        match self {
            Statement::Simple(query) => query.consistency(),
            Statement::Prepared(prepared) => prepared.consistency(),
        }
    }

    /// 문장별 직렬 일관성 오버라이드
    pub fn serial_consistency(&self) -> Option<SerialConsistency> {
        match self {
            Statement::Simple(query) => query.serial_consistency(),
            Statement::Prepared(prepared) => prepared.serial_consistency(),
        }
    }

    /// 문장별 페이지 크기 오버라이드
    pub fn page_size(&self) -> Option<i32> {
        match self {
            Statement::Simple(query) => query.page_size(),
            Statement::Prepared(prepared) => prepared.page_size(),
        }
    }

    /// 문장별 요청 타임아웃 오버라이드
    pub fn request_timeout(&self) -> Option<Duration> {
        match self {
            Statement::Simple(query) => query.request_timeout(),
            Statement::Prepared(prepared) => prepared.request_timeout(),
        }
    }

    /// 조건부 문장 여부 (IF 절)
    pub fn is_conditional(&self) -> bool {
        is_conditional_cql(self.cql())
    }
}

impl From<Query> for Statement {
    fn from(query: Query) -> Self {
        Statement::Simple(query)
    }
}

impl From<PreparedStatement> for Statement {
    fn from(prepared: PreparedStatement) -> Self {
        Statement::Prepared(prepared)
    }
}

impl From<&str> for Statement {
    fn from(s: &str) -> Self {
        Statement::Simple(Query::new(s))
    }
}

impl From<String> for Statement {
    fn from(s: String) -> Self {
        Statement::Simple(Query::new(s))
    }
}

/// CQL 텍스트에 IF 절이 있는지 확인
pub(crate) fn is_conditional_cql(cql: &str) -> bool {
    let upper = cql.to_ascii_uppercase();
    upper.contains(" IF ") || upper.ends_with(" IF EXISTS") || upper.ends_with(" IF NOT EXISTS")
}

// ============================================================================
// BatchStatement - 배치 문장
// ============================================================================

/// 배치 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BatchType {
    /// 로그 배치 (기본값)
    #[default]
    Logged = 0,
    /// 비로그 배치
    Unlogged = 1,
    /// 카운터 배치
    Counter = 2,
}

impl BatchType {
    /// 와이어 코드
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// 배치 항목
#[derive(Debug, Clone)]
pub enum BatchEntry {
    /// 단순 문장
    Simple(Query),
    /// 준비된 문장
    Prepared(PreparedStatement),
}

impl From<Query> for BatchEntry {
    fn from(query: Query) -> Self {
        BatchEntry::Simple(query)
    }
}

impl From<PreparedStatement> for BatchEntry {
    fn from(prepared: PreparedStatement) -> Self {
        BatchEntry::Prepared(prepared)
    }
}

/// 배치 문장
///
/// 여러 데이터 변경 문장을 한 요청으로 실행합니다. 클러스터가 배치를
/// 하나의 요청으로 다룬다는 의미 이상의 원자성은 추가하지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct BatchStatement {
    batch_type: BatchType,
    pub(crate) statements: Vec<BatchEntry>,
    consistency: Option<Consistency>,
    serial_consistency: Option<SerialConsistency>,
}

impl BatchStatement {
    /// 새 배치 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 배치 타입 지정 생성
    pub fn with_type(batch_type: BatchType) -> Self {
        Self {
            batch_type,
            ..Default::default()
        }
    }

    /// 문장 추가
    ///
    /// 바인드 마커가 있는 단순 문장을 배치에 넣는 것은 권장하지 않습니다.
    /// 준비된 문장을 먼저 만들어 추가하는 편이 효율적입니다.
    pub fn append_statement(&mut self, statement: impl Into<BatchEntry>) {
        self.statements.push(statement.into());
    }

    /// 배치 타입
    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    /// 배치 내 문장 수
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// 빈 배치 여부
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// 일관성 설정
    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = Some(consistency);
    }

    /// 직렬 일관성 설정
    pub fn set_serial_consistency(&mut self, serial: SerialConsistency) {
        self.serial_consistency = Some(serial);
    }

    /// 설정된 일관성
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    /// 설정된 직렬 일관성
    pub fn serial_consistency(&self) -> Option<SerialConsistency> {
        self.serial_consistency
    }
}

impl fmt::Display for BatchStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BatchStatement: {:?}",
            self.statements
                .iter()
                .map(|s| match s {
                    BatchEntry::Simple(query) => query.contents.clone(),
                    BatchEntry::Prepared(prepared) => prepared.statement.clone(),
                })
                .collect::<Vec<_>>()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
