use serde::{Deserialize, Serialize};

/// 回报给上游生产者的任务结果事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProducerEvent {
    JobCompleted {
        id: String,
        result: serde_json::Value,
    },
    JobFailed {
        id: String,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    NotPermitted { id: String, job_type_name: String },
}

impl ProducerEvent {
    pub fn job_id(&self) -> &str {
        match self {
            ProducerEvent::JobCompleted { id, .. }
            | ProducerEvent::JobFailed { id, .. }
            | ProducerEvent::NotPermitted { id, .. } => id,
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = ProducerEvent::NotPermitted {
            id: "x".to_string(),
            job_type_name: "NOPE".to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&event.to_json_line().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "NOT_PERMITTED", "id": "x", "jobTypeName": "NOPE"}));

        let failed = ProducerEvent::JobFailed {
            id: "y".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(failed.job_id(), "y");
        assert!(failed.to_json_line().unwrap().contains("\"JOB_FAILED\""));
    }
}
