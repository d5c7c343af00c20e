//! Turns the assistant's meal analysis into structured nutrition data.
//!
//! The analysis is free text where a few marker lines open sections:
//!
//! ```text
//! 🍽️ **Alimentos identificados:**
//! - **Arroz**
//! 📊 **Informação nutricional:**
//! Calorias: 450 kcal
//! 💡 **Dica:**
//! Inclua vegetais.
//! ```
//!
//! Parsing is a line-by-line state machine. Text that yields nothing falls
//! back to being shown verbatim.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Nutrients {
    pub calories: Option<u32>,
    pub protein_grams: Option<u32>,
    pub carb_grams: Option<u32>,
    pub fat_grams: Option<u32>,
}

impl Nutrients {
    pub fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.protein_grams.is_none()
            && self.carb_grams.is_none()
            && self.fat_grams.is_none()
    }

    fn slot(&mut self, nutrient: Nutrient) -> &mut Option<u32> {
        match nutrient {
            Nutrient::Calories => &mut self.calories,
            Nutrient::Protein => &mut self.protein_grams,
            Nutrient::Carbs => &mut self.carb_grams,
            Nutrient::Fat => &mut self.fat_grams,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct NutritionReport {
    pub foods: Vec<String>,
    pub nutrients: Nutrients,
    pub tip: Option<String>,
}

impl NutritionReport {
    pub fn is_empty(&self) -> bool {
        self.foods.is_empty() && self.nutrients.is_empty() && self.tip.is_none()
    }
}

/// What a UI should show for an analysis reply.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AnalysisView {
    Structured(NutritionReport),
    /// The original text, unchanged.
    Plain(String),
}

pub fn render(text: &str) -> AnalysisView {
    match extract(text) {
        Some(report) => AnalysisView::Structured(report),
        None => AnalysisView::Plain(text.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Seeking,
    Foods,
    Nutrients,
    Tip,
}

struct Marker {
    glyph: &'static str,
    keywords: &'static [&'static str],
    opens: Section,
}

/// Marker lines and the section each one switches to, from any state.
const MARKERS: &[Marker] = &[
    Marker {
        glyph: "🍽",
        keywords: &["aliment", "food"],
        opens: Section::Foods,
    },
    Marker {
        glyph: "📊",
        keywords: &["nutri"],
        opens: Section::Nutrients,
    },
    Marker {
        glyph: "💡",
        keywords: &["dica", "tip"],
        opens: Section::Tip,
    },
];

fn marker_section(line: &str) -> Option<Section> {
    let head = line.trim_start_matches(|c: char| c.is_whitespace() || c == '#' || c == '*');
    let lower = line.to_lowercase();
    MARKERS
        .iter()
        .find(|m| head.starts_with(m.glyph) && m.keywords.iter().any(|k| lower.contains(k)))
        .map(|m| m.opens)
}

#[derive(Debug, Clone, Copy)]
enum Nutrient {
    Calories,
    Protein,
    Carbs,
    Fat,
}

/// The amount is the number right before the unit; anything may sit between
/// the keyword and it, e.g. `Proteínas (2 ovos): 12g`.
const GRAMS: &str = r".*?\b(\d+(?:[.,]\d+)?)\s*g(?:ramas?)?\b";

/// Tried in order; the first pattern that matches a line claims it.
static NUTRIENT_PATTERNS: LazyLock<Vec<(Nutrient, Regex)>> = LazyLock::new(|| {
    let grams = |keywords: &str| format!(r"(?i)\b(?:{}){}", keywords, GRAMS);
    [
        (
            Nutrient::Calories,
            r"(?i)\b(?:calor[ií]as|calories)\b.*?\b(\d{1,3}(?:[.,]\d{3})+|\d+(?:[.,]\d+)?)\s*kcal"
                .to_string(),
        ),
        (Nutrient::Protein, grams(r"prote[ií]nas?|proteins?")),
        (
            Nutrient::Carbs,
            grams(r"carboidratos?|carbo-?hidratos?|carbohydrates?|carbs?"),
        ),
        (Nutrient::Fat, grams(r"gorduras?|lip[ií]dios?|fats?")),
    ]
    .into_iter()
    .filter_map(|(nutrient, pattern)| Regex::new(&pattern).ok().map(|re| (nutrient, re)))
    .collect()
});

fn parse_amount(nutrient: Nutrient, raw: &str) -> Option<u32> {
    match nutrient {
        Nutrient::Calories if is_grouped(raw) => raw.replace(['.', ','], "").parse().ok(),
        _ => parse_decimal(raw),
    }
}

/// `1.200` and `1,200` group thousands; `450,5` is a decimal.
fn is_grouped(raw: &str) -> bool {
    raw.contains(['.', ','])
        && raw
            .split(['.', ','])
            .skip(1)
            .all(|group| group.len() == 3)
}

fn parse_decimal(raw: &str) -> Option<u32> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .map(|amount| amount.round() as u32)
}

#[derive(Default)]
struct Extractor {
    report: NutritionReport,
    tip: Vec<String>,
}

impl Extractor {
    fn take_line(&mut self, section: Section, line: &str) {
        match section {
            Section::Seeking => {}
            Section::Foods => self.take_food(line),
            Section::Nutrients => self.take_nutrient(line),
            Section::Tip => {
                let line = line.trim();
                if !line.is_empty() {
                    self.tip.push(line.to_string());
                }
            }
        }
    }

    fn take_food(&mut self, line: &str) {
        // "- item"; a rule like "---" is not a bullet
        let Some(item) = line
            .trim_start()
            .strip_prefix('-')
            .filter(|rest| rest.starts_with(char::is_whitespace))
        else {
            return;
        };
        let food = item.replace('*', "");
        let food = food.trim();
        if !food.is_empty() {
            self.report.foods.push(food.to_string());
        }
    }

    fn take_nutrient(&mut self, line: &str) {
        for (nutrient, re) in NUTRIENT_PATTERNS.iter() {
            let Some(caps) = re.captures(line) else {
                continue;
            };
            let slot = self.report.nutrients.slot(*nutrient);
            if slot.is_none() {
                *slot = caps.get(1).and_then(|m| parse_amount(*nutrient, m.as_str()));
            }
            return;
        }
    }

    fn finish(mut self) -> NutritionReport {
        let tip = self.tip.join(" ");
        let tip = tip.trim();
        if !tip.is_empty() {
            self.report.tip = Some(tip.to_string());
        }
        self.report
    }
}

/// Extracts a [`NutritionReport`] from marker-annotated text. Returns `None`
/// when nothing structured was found; callers then show `text` as is.
pub fn extract(text: &str) -> Option<NutritionReport> {
    let mut section = Section::Seeking;
    let mut extractor = Extractor::default();

    for line in text.lines() {
        match marker_section(line) {
            Some(next) => section = next,
            None => extractor.take_line(section, line),
        }
    }

    let report = extractor.finish();
    if report.is_empty() {
        None
    } else {
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = "Analisei sua refeição!

🍽️ **Alimentos identificados:**
- **Arroz**
- Frango
Parece um prato equilibrado.

📊 **Informação nutricional:**
Calorias: 450 kcal
Proteínas: 30g
Carboidratos: 55g
Gorduras: 12g

💡 **Dica:**
Inclua mais vegetais
no jantar.
";

    #[test]
    fn test_full_report() {
        let report = extract(ANALYSIS).unwrap();
        assert_eq!(report.foods, vec!["Arroz", "Frango"]);
        assert_eq!(
            report.nutrients,
            Nutrients {
                calories: Some(450),
                protein_grams: Some(30),
                carb_grams: Some(55),
                fat_grams: Some(12),
            }
        );
        assert_eq!(report.tip.as_deref(), Some("Inclua mais vegetais no jantar."));
    }

    #[test]
    fn test_unaccented_and_english_keywords() {
        let report = extract("📊 Nutrients\nProteinas: 28 g\nCalories: 510 kcal\nFat: 9 gramas").unwrap();
        assert_eq!(report.nutrients.protein_grams, Some(28));
        assert_eq!(report.nutrients.calories, Some(510));
        assert_eq!(report.nutrients.fat_grams, Some(9));
        assert_eq!(report.nutrients.carb_grams, None);
    }

    #[test]
    fn test_first_match_wins_and_one_field_per_line() {
        let report =
            extract("📊 nutrição\nProteínas: 30g, Carboidratos: 50g\nProteínas: 99g").unwrap();
        assert_eq!(report.nutrients.protein_grams, Some(30));
        assert_eq!(report.nutrients.carb_grams, None);
    }

    #[test]
    fn test_thousands_and_decimal_amounts() {
        let report = extract("📊 Nutrição\nCalorias: 1.200 kcal\nGorduras: 2,5g").unwrap();
        assert_eq!(report.nutrients.calories, Some(1200));
        assert_eq!(report.nutrients.fat_grams, Some(3));
    }

    #[test]
    fn test_digits_between_keyword_and_amount() {
        let report =
            extract("📊 Nutrição\nCalorias (porção de 200g): 450 kcal\nProteínas (2 ovos): 12g")
                .unwrap();
        assert_eq!(report.nutrients.calories, Some(450));
        assert_eq!(report.nutrients.protein_grams, Some(12));
    }

    #[test]
    fn test_calories_with_comma() {
        let report = extract("📊 Nutrição\nCalorias: 450,4 kcal").unwrap();
        assert_eq!(report.nutrients.calories, Some(450));
        let report = extract("📊 Nutrition\nCalories: 1,200 kcal").unwrap();
        assert_eq!(report.nutrients.calories, Some(1200));
    }

    #[test]
    fn test_rule_in_foods_section_is_not_a_food() {
        let report = extract("🍽️ Alimentos\n- Arroz\n---\n-Feijão\n📊 Nutrição\nCalorias: 450 kcal")
            .unwrap();
        assert_eq!(report.foods, vec!["Arroz"]);
        assert_eq!(report.nutrients.calories, Some(450));
    }

    #[test]
    fn test_sections_can_switch_back() {
        let text = "💡 Dica\nBeba água.\n🍽 Alimentos\n- Feijão\n💡 dica extra\nDurma bem.";
        let report = extract(text).unwrap();
        assert_eq!(report.foods, vec!["Feijão"]);
        assert_eq!(report.tip.as_deref(), Some("Beba água. Durma bem."));
    }

    #[test]
    fn test_lines_before_first_marker_ignored() {
        let report = extract("- Pão\nCalorias: 300 kcal\n🍽️ Alimentos\n- Ovo").unwrap();
        assert_eq!(report.foods, vec!["Ovo"]);
        assert!(report.nutrients.is_empty());
    }

    #[test]
    fn test_glyph_without_keyword_is_not_marker() {
        assert_eq!(marker_section("🍽️ Bom apetite!"), None);
        assert_eq!(marker_section("Alimentos:"), None);
        assert_eq!(marker_section("### 📊 Valores Nutricionais"), Some(Section::Nutrients));
    }

    #[test]
    fn test_unstructured_text_passes_through() {
        let text = "Não consegui identificar alimentos nesta foto.\n- tente outra imagem";
        assert_eq!(extract(text), None);
        assert_eq!(render(text), AnalysisView::Plain(text.to_string()));
    }

    #[test]
    fn test_markers_with_empty_sections_fall_back() {
        let text = "🍽️ Alimentos\nnenhum\n📊 Nutrição\nsem dados\n💡 Dica\n   ";
        assert_eq!(render(text), AnalysisView::Plain(text.to_string()));
    }
}
