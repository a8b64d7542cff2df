use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The twelve signs, labelled the way the profile form shows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constellation {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

/// Elemental grouping of a sign. `Unknown` covers every unrecognised label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Fire,
    Water,
    Earth,
    Air,
    Unknown,
}

impl Constellation {
    /// Select order used by the sidebar form.
    pub const ALL: [Constellation; 12] = [
        Constellation::Aries,
        Constellation::Taurus,
        Constellation::Gemini,
        Constellation::Cancer,
        Constellation::Leo,
        Constellation::Virgo,
        Constellation::Libra,
        Constellation::Scorpio,
        Constellation::Sagittarius,
        Constellation::Capricorn,
        Constellation::Aquarius,
        Constellation::Pisces,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Constellation::Aries => "白羊",
            Constellation::Taurus => "金牛",
            Constellation::Gemini => "双子",
            Constellation::Cancer => "巨蟹",
            Constellation::Leo => "狮子",
            Constellation::Virgo => "处女",
            Constellation::Libra => "天秤",
            Constellation::Scorpio => "天蝎",
            Constellation::Sagittarius => "射手",
            Constellation::Capricorn => "摩羯",
            Constellation::Aquarius => "水瓶",
            Constellation::Pisces => "双鱼",
        }
    }

    pub fn element(self) -> Element {
        match self {
            Constellation::Aries | Constellation::Leo | Constellation::Sagittarius => Element::Fire,
            Constellation::Cancer | Constellation::Scorpio | Constellation::Pisces => Element::Water,
            Constellation::Taurus | Constellation::Virgo | Constellation::Capricorn => Element::Earth,
            Constellation::Gemini | Constellation::Libra | Constellation::Aquarius => Element::Air,
        }
    }
}

impl Serialize for Constellation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl fmt::Display for Constellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("无法识别的星座：{0}")]
pub struct UnknownConstellation(pub String);

impl FromStr for Constellation {
    type Err = UnknownConstellation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constellation::ALL
            .into_iter()
            .find(|c| c.label() == s)
            .ok_or_else(|| UnknownConstellation(s.to_string()))
    }
}

impl Element {
    pub fn label(self) -> &'static str {
        match self {
            Element::Fire => "火象星座",
            Element::Water => "水象星座",
            Element::Earth => "土象星座",
            Element::Air => "风象星座",
            Element::Unknown => "未知元素",
        }
    }

    /// Archetype behaviours the persona leans on for this element.
    pub fn traits(self) -> &'static str {
        match self {
            Element::Fire => "行动力、热情、直接",
            Element::Water => "情感细腻、直觉强、敏感",
            Element::Earth => "务实、稳定、注重实际",
            Element::Air => "理性、沟通、灵活",
            Element::Unknown => "",
        }
    }

    pub fn is_known(self) -> bool {
        self != Element::Unknown
    }
}

/// Maps a sign label to its element. Total: anything outside the table is `Unknown`.
pub fn classify(sign: &str) -> Element {
    sign.parse::<Constellation>()
        .map(Constellation::element)
        .unwrap_or(Element::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_full_table() {
        for sign in ["白羊", "狮子", "射手"] {
            assert_eq!(classify(sign), Element::Fire, "{sign}");
        }
        for sign in ["巨蟹", "天蝎", "双鱼"] {
            assert_eq!(classify(sign), Element::Water, "{sign}");
        }
        for sign in ["金牛", "处女", "摩羯"] {
            assert_eq!(classify(sign), Element::Earth, "{sign}");
        }
        for sign in ["双子", "天秤", "水瓶"] {
            assert_eq!(classify(sign), Element::Air, "{sign}");
        }
    }

    #[test]
    fn test_classify_unknown_inputs() {
        assert_eq!(classify(""), Element::Unknown);
        assert_eq!(classify("白羊座"), Element::Unknown);
        assert_eq!(classify("Leo"), Element::Unknown);
        assert_eq!(classify(" 狮子"), Element::Unknown);
    }

    #[test]
    fn test_each_element_has_three_signs() {
        for element in [Element::Fire, Element::Water, Element::Earth, Element::Air] {
            let count = Constellation::ALL
                .iter()
                .filter(|c| c.element() == element)
                .count();
            assert_eq!(count, 3, "{element:?}");
        }
    }

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for c in Constellation::ALL {
            assert_eq!(c.label().parse::<Constellation>(), Ok(c));
        }
        assert_eq!(
            "火星".parse::<Constellation>(),
            Err(UnknownConstellation("火星".to_string()))
        );
    }

    #[test]
    fn test_element_labels() {
        assert_eq!(classify("狮子").label(), "火象星座");
        assert_eq!(classify("").label(), "未知元素");
        assert!(!Element::Unknown.is_known());
        assert!(Element::Air.is_known());
    }
}
