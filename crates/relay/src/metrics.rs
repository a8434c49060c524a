use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock, PoisonError,
    },
};

use crate::registry::RegistryCounts;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

pub struct RelayMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    ws_frames_total: Mutex<HashMap<String, u64>>,
    ws_frame_errors_total: Mutex<HashMap<String, u64>>,
    deliveries_total: Mutex<HashMap<String, u64>>,
    delivery_drops_total: Mutex<HashMap<String, u64>>,
    presence_transitions_total: Mutex<HashMap<String, u64>>,
    notifications_recorded_total: Mutex<HashMap<String, u64>>,
    connections_opened_total: AtomicU64,
    connections_closed_total: AtomicU64,
    open_connections: AtomicU64,
    anonymous_connections: AtomicU64,
    online_users: AtomicU64,
}

const DROP_REASONS: [&str; 3] = ["queue_full", "closed", "no_transport"];
const PRESENCE_KINDS: [&str; 2] = ["online", "offline"];
static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

impl Default for RelayMetrics {
    fn default() -> Self {
        let seeded = |labels: &[&str]| {
            labels.iter().map(|label| (label.to_string(), 0)).collect::<HashMap<_, _>>()
        };

        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            ws_frames_total: Mutex::new(HashMap::new()),
            ws_frame_errors_total: Mutex::new(HashMap::new()),
            deliveries_total: Mutex::new(HashMap::new()),
            delivery_drops_total: Mutex::new(seeded(&DROP_REASONS)),
            presence_transitions_total: Mutex::new(seeded(&PRESENCE_KINDS)),
            notifications_recorded_total: Mutex::new(HashMap::new()),
            connections_opened_total: AtomicU64::new(0),
            connections_closed_total: AtomicU64::new(0),
            open_connections: AtomicU64::new(0),
            anonymous_connections: AtomicU64::new(0),
            online_users: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

pub fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_ws_frame(event: &str, is_error: bool) {
    if let Some(metrics) = global_metrics() {
        metrics.record_ws_frame(event, is_error);
    }
}

pub fn record_delivery(event: &str, delivered: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_delivery(event, delivered);
    }
}

pub fn record_delivery_drop(reason: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.record_delivery_drop(reason);
    }
}

pub fn record_presence_transition(kind: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.record_presence_transition(kind);
    }
}

pub fn record_notification(category: &str) {
    if let Some(metrics) = global_metrics() {
        metrics.record_notification(category);
    }
}

pub fn record_connection_opened() {
    if let Some(metrics) = global_metrics() {
        metrics.connections_opened_total.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn record_connection_closed() {
    if let Some(metrics) = global_metrics() {
        metrics.connections_closed_total.fetch_add(1, Ordering::SeqCst);
    }
}

impl RelayMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn record_ws_frame(&self, event: &str, is_error: bool) {
        let label = normalize_label(event);
        increment_label_counter(&self.ws_frames_total, &label, 1);
        if is_error {
            increment_label_counter(&self.ws_frame_errors_total, &label, 1);
        }
    }

    pub fn record_delivery(&self, event: &str, delivered: u64) {
        increment_label_counter(&self.deliveries_total, &normalize_label(event), delivered);
    }

    pub fn record_delivery_drop(&self, reason: &str) {
        increment_label_counter(&self.delivery_drops_total, &normalize_label(reason), 1);
    }

    pub fn record_presence_transition(&self, kind: &str) {
        increment_label_counter(&self.presence_transitions_total, &normalize_label(kind), 1);
    }

    pub fn record_notification(&self, category: &str) {
        increment_label_counter(&self.notifications_recorded_total, &normalize_label(category), 1);
    }

    /// Refresh point-in-time gauges right before a scrape.
    pub fn set_presence_gauges(&self, counts: RegistryCounts) {
        self.open_connections.store(counts.connections as u64, Ordering::SeqCst);
        self.anonymous_connections.store(counts.anonymous() as u64, Ordering::SeqCst);
        self.online_users.store(counts.online as u64, Ordering::SeqCst);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP relay_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE relay_request_rate_total counter\n");
        append_counter_lines(&mut output, "relay_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP relay_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE relay_request_errors_total counter\n");
        append_counter_lines(&mut output, "relay_request_errors_total", &self.request_errors_total);

        output.push_str("# HELP relay_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_sum counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP relay_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE relay_request_duration_ms_count counter\n");
        append_counter_lines(
            &mut output,
            "relay_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str("# HELP relay_ws_frames_total Inbound websocket frames by event.\n");
        output.push_str("# TYPE relay_ws_frames_total counter\n");
        append_label_counter_lines(&mut output, "relay_ws_frames_total", "event", &self.ws_frames_total);

        output.push_str(
            "# HELP relay_ws_frame_errors_total Rejected inbound websocket frames by event.\n",
        );
        output.push_str("# TYPE relay_ws_frame_errors_total counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_ws_frame_errors_total",
            "event",
            &self.ws_frame_errors_total,
        );

        output.push_str("# HELP relay_deliveries_total Frames queued to connections by event.\n");
        output.push_str("# TYPE relay_deliveries_total counter\n");
        append_label_counter_lines(&mut output, "relay_deliveries_total", "event", &self.deliveries_total);

        output.push_str("# HELP relay_delivery_drops_total Frames dropped during fan-out by reason.\n");
        output.push_str("# TYPE relay_delivery_drops_total counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_delivery_drops_total",
            "reason",
            &self.delivery_drops_total,
        );

        output.push_str("# HELP relay_presence_transitions_total Online/offline transitions.\n");
        output.push_str("# TYPE relay_presence_transitions_total counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_presence_transitions_total",
            "kind",
            &self.presence_transitions_total,
        );

        output.push_str(
            "# HELP relay_notifications_recorded_total Notifications recorded by category.\n",
        );
        output.push_str("# TYPE relay_notifications_recorded_total counter\n");
        append_label_counter_lines(
            &mut output,
            "relay_notifications_recorded_total",
            "category",
            &self.notifications_recorded_total,
        );

        output.push_str("# HELP relay_connections_opened_total Accepted websocket connections.\n");
        output.push_str("# TYPE relay_connections_opened_total counter\n");
        output.push_str(&format!(
            "relay_connections_opened_total {}\n",
            self.connections_opened_total.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP relay_connections_closed_total Closed websocket connections.\n");
        output.push_str("# TYPE relay_connections_closed_total counter\n");
        output.push_str(&format!(
            "relay_connections_closed_total {}\n",
            self.connections_closed_total.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP relay_open_connections Currently open websocket connections.\n");
        output.push_str("# TYPE relay_open_connections gauge\n");
        output.push_str(&format!(
            "relay_open_connections {}\n",
            self.open_connections.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP relay_anonymous_connections Open websocket connections that have not joined.\n",
        );
        output.push_str("# TYPE relay_anonymous_connections gauge\n");
        output.push_str(&format!(
            "relay_anonymous_connections {}\n",
            self.anonymous_connections.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP relay_online_users Distinct logical users currently online.\n");
        output.push_str("# TYPE relay_online_users gauge\n");
        output.push_str(&format!(
            "relay_online_users {}\n",
            self.online_users.load(Ordering::SeqCst)
        ));

        output
    }
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment.starts_with("notif_") {
            normalized_segments.push("{notification_id}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

fn normalize_label(label: &str) -> String {
    let normalized = label.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

fn increment_counter(
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
    key: &EndpointMetricKey,
    delta: u64,
) {
    let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn increment_label_counter(map: &Mutex<HashMap<String, u64>>, label: &str, delta: u64) {
    let mut guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let value = guard.entry(label.to_string()).or_insert(0);
    *value = value.saturating_add(delta);
}

fn append_counter_lines(
    output: &mut String,
    metric_name: &str,
    map: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left_key, _), (right_key, _)| {
        left_key
            .method
            .cmp(&right_key.method)
            .then_with(|| left_key.endpoint.cmp(&right_key.endpoint))
    });

    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{method=\"{}\",endpoint=\"{}\"}} {value}\n",
            escape_label_value(&key.method),
            escape_label_value(&key.endpoint),
        ));
    }
}

fn append_label_counter_lines(
    output: &mut String,
    metric_name: &str,
    label_name: &str,
    map: &Mutex<HashMap<String, u64>>,
) {
    let guard = map.lock().unwrap_or_else(PoisonError::into_inner);
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (label, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{{label_name}=\"{}\"}} {value}\n",
            escape_label_value(label),
        ));
    }
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}
