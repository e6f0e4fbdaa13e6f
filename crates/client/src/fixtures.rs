//! Shared builders for unit tests.

use guidewatch_protocol::{Guide, GuideId, OperatorRef, StatusOption};

pub const OPERATOR: i64 = 3;
pub const OTHER_OPERATOR: i64 = 1;

pub fn guide(id: &str) -> Guide {
    Guide {
        guide_id: GuideId::new(id),
        via_guide_id: format!("V-{id}"),
        recipient: format!("Recipient {id}"),
        status: "initial".to_string(),
        last_change: None,
        payment: String::new(),
        operator: None,
        selectable: true,
        highlight: false,
    }
}

pub fn assigned(mut guide: Guide, operator_id: i64) -> Guide {
    guide.operator = Some(OperatorRef {
        id: operator_id,
        account: format!("op{operator_id}"),
        name: format!("Operator {operator_id}"),
        enabled: true,
    });
    guide
}

pub fn highlighted(mut guide: Guide) -> Guide {
    guide.highlight = true;
    guide
}

pub fn delivered() -> StatusOption {
    StatusOption::new("DELIVERED", "Entregado")
}
