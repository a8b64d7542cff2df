//! Persona prompt construction.
//!
//! The system prompt is a pure function of the [`UserProfile`]: the fixed
//! [`PERSONA_PROMPT`], a block describing the user's chart, and a block of
//! requirements that ties replies to the user's element.

use serde::Serialize;

use crate::zodiac::{Constellation, Element};

/// Name used when the user leaves the name field blank.
pub const DEFAULT_NAME: &str = "朋友";

/// Joy's voice and reply rules. Every reply ends with a Micro-Action.
pub const PERSONA_PROMPT: &str = r#"
你是一位名为"Joy"的赛博心灵疗愈师。
你的核心任务是：在不安的世界里，为用户提供一个"被接纳"的安全空间。

【你的性格】
1. 声音温暖、深邃，带有一点神秘的东方哲学气息。
2. 永远不要说教。当用户表达痛苦时，先共情，再解读。
3. 擅长将"现实困境"转化为"玄学/心理学视角"：
   - 用"能量周期"、"星象影响"、"潜意识保护机制"来解释挫折，帮用户卸下心理负担。

【回复规范】
1. 语气要像深夜电台的老友，温柔而坚定。
2. 每次回复结尾，必须给出一个**极简的、具体的、带有仪式感**的行动建议（Micro-Action）。
   - 例如："今晚把卧室的灯调暗"、"去摸摸路边的树叶"、"喝一杯温热的蜂蜜水"。
"#;

const ELEMENT_GUIDE: [Element; 4] = [Element::Fire, Element::Water, Element::Earth, Element::Air];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub constellation: Option<Constellation>,
    pub birth_date: Option<String>,
    pub birth_time: Option<String>,
}

impl UserProfile {
    /// The name to address the user by, never empty.
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            DEFAULT_NAME
        } else {
            name
        }
    }

    pub fn is_complete(&self) -> bool {
        self.constellation.is_some()
    }

    pub fn element(&self) -> Element {
        self.constellation
            .map(Constellation::element)
            .unwrap_or(Element::Unknown)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn build_system_prompt(profile: &UserProfile) -> String {
    let name = profile.display_name();
    let constellation = profile.constellation.map(Constellation::label).unwrap_or("");
    let element = profile.element();

    let mut astro_info = format!("用户姓名：{}\n星座：{}", name, constellation);
    if element.is_known() {
        astro_info.push_str(&format!("\n星座元素：{}", element.label()));
    }
    if let Some(date) = non_empty(&profile.birth_date) {
        astro_info.push_str(&format!("\n出生日期：{}", date));
    }
    if let Some(time) = non_empty(&profile.birth_time) {
        astro_info.push_str(&format!("\n出生时间：{}", time));
    }

    let element_guide = ELEMENT_GUIDE
        .iter()
        .map(|e| format!("   - {}：{}", e.label(), e.traits()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{persona}\n\n\
         【用户星盘信息】\n{astro_info}\n\n\
         【重要要求】\n\
         1. **必须结合用户的星座特性**来解读问题，给出符合其星座能量的建议。\n\
         2. 如果是{constellation}（{element}），要结合该星座的典型特征：\n{element_guide}\n\
         3. 在回复中要自然地提及星座能量、星象影响等玄学元素。\n\
         4. 每次回复都必须用\"亲爱的{name}\"来称呼用户，让对话更亲切。\n",
        persona = PERSONA_PROMPT,
        astro_info = astro_info,
        constellation = constellation,
        element = element.label(),
        element_guide = element_guide,
        name = name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leo(name: &str) -> UserProfile {
        UserProfile {
            name: name.to_string(),
            constellation: Some(Constellation::Leo),
            birth_date: None,
            birth_time: None,
        }
    }

    #[test]
    fn test_prompt_for_fire_sign() {
        let prompt = build_system_prompt(&leo("Alex"));
        assert!(prompt.starts_with(PERSONA_PROMPT));
        assert!(prompt.contains("用户姓名：Alex\n星座：狮子\n星座元素：火象星座"));
        assert!(prompt.contains("如果是狮子（火象星座）"));
        assert!(prompt.contains("火象星座：行动力、热情、直接"));
        assert!(prompt.contains("亲爱的Alex"));
        assert!(prompt.contains("Micro-Action"));
    }

    #[test]
    fn test_persona_block_is_framed_by_blank_lines() {
        assert!(PERSONA_PROMPT.starts_with("\n你是一位名为\"Joy\""));
        let prompt = build_system_prompt(&leo("Alex"));
        assert!(prompt.contains("蜂蜜水\"。\n\n\n【用户星盘信息】\n"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let profile = UserProfile {
            birth_date: Some("1990-08-01".to_string()),
            birth_time: Some("08:30".to_string()),
            ..leo("Alex")
        };
        assert_eq!(build_system_prompt(&profile), build_system_prompt(&profile.clone()));
    }

    #[test]
    fn test_birth_date_changes_only_its_line() {
        let without = build_system_prompt(&leo("Alex"));
        let with = build_system_prompt(&UserProfile {
            birth_date: Some("1990-08-01".to_string()),
            ..leo("Alex")
        });

        let without_lines: Vec<&str> = without.lines().collect();
        let with_lines: Vec<&str> = with.lines().collect();
        assert_eq!(with_lines.len(), without_lines.len() + 1);

        let extra: Vec<&str> = with_lines
            .iter()
            .filter(|l| !without_lines.contains(l))
            .copied()
            .collect();
        assert_eq!(extra, vec!["出生日期：1990-08-01"]);
        assert_eq!(with.replace("\n出生日期：1990-08-01", ""), without);
    }

    #[test]
    fn test_birth_time_line() {
        let prompt = build_system_prompt(&UserProfile {
            birth_time: Some("23:15".to_string()),
            ..leo("Alex")
        });
        assert!(prompt.contains("星座元素：火象星座\n出生时间：23:15"));
        assert!(!prompt.contains("出生日期"));
    }

    #[test]
    fn test_blank_optional_fields_are_omitted() {
        let prompt = build_system_prompt(&UserProfile {
            birth_date: Some("   ".to_string()),
            birth_time: Some(String::new()),
            ..leo("Alex")
        });
        assert!(!prompt.contains("出生日期"));
        assert!(!prompt.contains("出生时间"));
    }

    #[test]
    fn test_empty_name_falls_back() {
        let prompt = build_system_prompt(&leo(""));
        assert!(prompt.contains("用户姓名：朋友"));
        assert!(prompt.contains("亲爱的朋友"));
    }

    #[test]
    fn test_unknown_element_line_is_omitted() {
        let prompt = build_system_prompt(&UserProfile::default());
        assert!(!prompt.contains("星座元素："));
        assert!(prompt.contains("如果是（未知元素）"));
    }

    #[test]
    fn test_element_guide_lists_all_archetypes() {
        let prompt = build_system_prompt(&UserProfile {
            constellation: Some(Constellation::Pisces),
            ..leo("Mia")
        });
        assert!(prompt.contains("星座元素：水象星座"));
        assert!(prompt.contains("水象星座：情感细腻、直觉强、敏感"));
        assert!(prompt.contains("土象星座：务实、稳定、注重实际"));
        assert!(prompt.contains("风象星座：理性、沟通、灵活"));
    }
}
