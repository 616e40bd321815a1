//! 通用工具函数

use uuid::Uuid;

/// 生成新的患者ID
pub fn generate_patient_id() -> String {
    format!("P-{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// 验证标识符格式（患者ID、科室ID）
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
