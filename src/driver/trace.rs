//! Tracing
//!
//! 추적 정보 (`system_traces`에서 조회)

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cql::CqlValue;

use super::row::Row;

/// 추적 세션 행 조회 쿼리
pub(crate) const SESSIONS_QUERY: &str = "SELECT client, command, coordinator, duration, \
     parameters, request, started_at FROM system_traces.sessions WHERE session_id = ?";

/// 추적 이벤트 행 조회 쿼리
pub(crate) const EVENTS_QUERY: &str = "SELECT event_id, activity, source, source_elapsed, \
     thread FROM system_traces.events WHERE session_id = ?";

/// 추적 행이 구체화되기를 기다리는 시도 횟수
pub(crate) const TRACE_FETCH_ATTEMPTS: u32 = 5;

/// 추적 조회 재시도 간격
pub(crate) const TRACE_FETCH_INTERVAL: Duration = Duration::from_millis(30);

// ============================================================================
// TracingInfo - 추적 정보
// ============================================================================

/// 추적 정보
///
/// `system_traces.sessions`의 세션 행과 `system_traces.events`의 모든
/// 이벤트입니다. 조회 시점에 아직 구체화되지 않았으면 부분 정보일 수
/// 있습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TracingInfo {
    pub client: Option<IpAddr>,
    pub command: Option<String>,
    pub coordinator: Option<IpAddr>,
    pub duration: Option<i32>,
    pub parameters: Option<HashMap<String, String>>,
    pub request: Option<String>,
    /// 유닉스 epoch 기준 밀리초
    pub started_at: Option<i64>,

    pub events: Vec<TracingEvent>,
}

/// 추적된 쿼리의 단일 이벤트
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracingEvent {
    pub event_id: uuid::Uuid,
    pub activity: Option<String>,
    pub source: Option<IpAddr>,
    pub source_elapsed: Option<i32>,
    pub thread: Option<String>,
}

impl TracingInfo {
    /// 세션 행에서 파싱
    pub(crate) fn from_session_row(row: &Row) -> Self {
        Self {
            client: row.get("client").and_then(CqlValue::as_inet),
            command: row
                .get("command")
                .and_then(|v| v.as_str().map(str::to_string)),
            coordinator: row.get("coordinator").and_then(CqlValue::as_inet),
            duration: row.get("duration").and_then(CqlValue::as_int),
            parameters: row.get("parameters").and_then(parse_text_map),
            request: row
                .get("request")
                .and_then(|v| v.as_str().map(str::to_string)),
            started_at: row.get("started_at").and_then(CqlValue::as_bigint),
            events: Vec::new(),
        }
    }

    /// 시작 시각을 chrono datetime으로 변환
    pub fn started_at_datetime(&self) -> Option<DateTime<Utc>> {
        self.started_at.and_then(DateTime::from_timestamp_millis)
    }
}

impl TracingEvent {
    /// 이벤트 행에서 파싱
    pub(crate) fn from_event_row(row: &Row) -> Option<Self> {
        let event_id = row.get("event_id").and_then(CqlValue::as_uuid)?;
        Some(Self {
            event_id,
            activity: row
                .get("activity")
                .and_then(|v| v.as_str().map(str::to_string)),
            source: row.get("source").and_then(CqlValue::as_inet),
            source_elapsed: row.get("source_elapsed").and_then(CqlValue::as_int),
            thread: row
                .get("thread")
                .and_then(|v| v.as_str().map(str::to_string)),
        })
    }
}

fn parse_text_map(value: &CqlValue) -> Option<HashMap<String, String>> {
    let entries = value.as_map()?;
    Some(
        entries
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================
