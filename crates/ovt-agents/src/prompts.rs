use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use ovt_models::agent_output::{FeatureSnapshot, NewsSummary};

/// Symbol with the strongest absolute score, preferring symbols that have a
/// feature snapshot. Ties go to the first symbol in key order.
pub fn focus_symbol<'a>(
    scores: &'a BTreeMap<String, f64>,
    snapshot: &BTreeMap<String, FeatureSnapshot>,
) -> Option<&'a str> {
    let strongest = |covered_only: bool| {
        scores
            .iter()
            .filter(|(symbol, _)| !covered_only || snapshot.contains_key(*symbol))
            .fold(None::<(&'a String, f64)>, |best, (symbol, score)| match best {
                Some((_, b)) if score.abs() <= b.abs() => best,
                _ => Some((symbol, *score)),
            })
            .map(|(symbol, _)| symbol.as_str())
    };
    strongest(true).or_else(|| strongest(false))
}

pub fn news_system_prompt() -> String {
    "You are a global macro strategist inside OV Trader, a research trading simulator. \
     Read market headlines and summarise their likely effect on equities and crypto. \
     Be concise and concrete."
        .to_string()
}

pub fn news_prompt(headlines: &[String]) -> String {
    let mut joined = String::new();
    for headline in headlines {
        let _ = writeln!(joined, "- {headline}");
    }
    format!(
        "Analyse the following headlines and produce:\n\
         1. A sentiment score between -1 (bearish) and +1 (bullish).\n\
         2. Key catalysts relevant to equities and crypto.\n\
         3. A list of tickers that could be impacted.\n\
         \nHeadlines:\n{joined}"
    )
}

/// Plain digest used when no model is available to summarise headlines.
pub fn headline_digest(headlines: &[String]) -> String {
    let mut digest = format!("{} headlines collected:", headlines.len());
    for headline in headlines {
        let _ = write!(digest, "\n- {headline}");
    }
    digest
}

pub fn commentary_system_prompt() -> String {
    "You are a quantitative analyst. Explain a cross-sectional momentum alpha in two or \
     three sentences, citing the numbers you are given."
        .to_string()
}

pub fn commentary_prompt(scores: &BTreeMap<String, f64>, top_n: usize) -> String {
    format!(
        "Alpha = 0.4*momentum_10 + 0.3*momentum_21 - 0.1*volatility_21 + 0.2*(close/ma_10 - 1).\n\
         Latest scores:\n{}",
        alpha_section(scores, top_n)
    )
}

pub fn decision_system_prompt() -> String {
    "You are an advanced trading strategist embedded in a portfolio research simulator. \
     Use the provided market intelligence to recommend an action that aims to beat the \
     broad market in simulation."
        .to_string()
}

/// Prompt for the decision model: alpha ranking, the focus symbol's
/// features, the news summary and the reply schema.
pub fn decision_prompt(
    timestamp: DateTime<Utc>,
    scores: &BTreeMap<String, f64>,
    snapshot: &BTreeMap<String, FeatureSnapshot>,
    news: Option<&NewsSummary>,
    top_n: usize,
) -> String {
    let focus = focus_symbol(scores, snapshot);
    let alpha = if scores.is_empty() {
        "No alpha data available.".to_string()
    } else {
        alpha_section(scores, top_n)
    };
    let market = focus
        .and_then(|symbol| snapshot.get(symbol))
        .map(market_section)
        .unwrap_or_else(|| "No detailed market snapshot available.".to_string());
    let news = news
        .map(|n| n.summary.clone())
        .unwrap_or_else(|| NewsSummary::placeholder().summary);

    format!(
        "Timestamp: {timestamp}\n\
         Focus symbol: {focus}\n\n\
         ### Alpha signals (top {top_n})\n{alpha}\n\n\
         ### Market feature snapshot for {focus_label}\n{market}\n\n\
         ### News and sentiment overview\n{news}\n\n\
         Follow this decision process:\n\
         1. Quantitative review: interpret the alpha signals, highlighting magnitude and sign.\n\
         2. Market structure: use the feature snapshot to infer trend, momentum and volatility.\n\
         3. News context: examine the qualitative summary for catalysts and risks.\n\
         4. Synthesis: choose a single action (buy, sell, hold) with a recommended position size.\n\n\
         Reference numbers from the sections above. \
         Respond with a JSON object containing the following keys:\n\
         - \"symbol\": ticker analysed.\n\
         - \"action\": one of \"buy\", \"sell\", or \"hold\".\n\
         - \"confidence\": integer between 0 and 100.\n\
         - \"target_weight\": recommended portfolio weight between -1.0 and 1.0.\n\
         - \"thesis\": concise synthesis (~3 sentences) combining alpha, market data, and news.\n\
         - \"risk_notes\": explicit downside risks or invalidation points.\n\
         - \"analysis\": list of strings, how each data source influenced the decision.\n\
         Return only the JSON object with no additional commentary.",
        focus = focus.unwrap_or("not enough data"),
        focus_label = focus.unwrap_or("N/A"),
    )
}

/// Top and bottom `top_n` scores, best first.
fn alpha_section(scores: &BTreeMap<String, f64>, top_n: usize) -> String {
    let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(s, v)| (s, *v)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut out = String::from("Top ranked signals:");
    for (symbol, score) in ranked.iter().take(top_n) {
        let _ = write!(out, "\n- {symbol}: {score:+.4}");
    }
    if ranked.len() > top_n {
        out.push_str("\nLowest ranked signals:");
        for (symbol, score) in &ranked[ranked.len() - top_n..] {
            let _ = write!(out, "\n- {symbol}: {score:+.4}");
        }
    }
    out
}

fn market_section(f: &FeatureSnapshot) -> String {
    format!(
        "As of: {}\nclose: {:.4}\nma_5: {:.4}\nma_10: {:.4}\nma_21: {:.4}\n\
         momentum_5: {:.4}\nmomentum_10: {:.4}\nmomentum_21: {:.4}\nvolatility_21: {:.4}",
        f.as_of,
        f.close,
        f.ma_5,
        f.ma_10,
        f.ma_21,
        f.momentum_5,
        f.momentum_10,
        f.momentum_21,
        f.volatility_21
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot_for(symbol: &str) -> BTreeMap<String, FeatureSnapshot> {
        BTreeMap::from([(
            symbol.to_string(),
            FeatureSnapshot {
                as_of: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                close: 101.5,
                ma_5: 100.0,
                ma_10: 99.0,
                ma_21: 97.0,
                momentum_5: 0.01,
                momentum_10: 0.02,
                momentum_21: 0.04,
                volatility_21: 0.012,
            },
        )])
    }

    #[test]
    fn focus_prefers_symbols_with_snapshot() {
        let scores = BTreeMap::from([("AAPL".to_string(), 0.1), ("MSFT".to_string(), -0.4)]);
        assert_eq!(focus_symbol(&scores, &snapshot_for("AAPL")), Some("AAPL"));
        assert_eq!(focus_symbol(&scores, &BTreeMap::new()), Some("MSFT"));
        assert_eq!(focus_symbol(&BTreeMap::new(), &BTreeMap::new()), None);
    }

    #[test]
    fn decision_prompt_has_required_sections() {
        let scores = BTreeMap::from([("AAPL".to_string(), 0.25)]);
        let prompt = decision_prompt(Utc::now(), &scores, &snapshot_for("AAPL"), None, 5);
        assert!(prompt.contains("Alpha signals"));
        assert!(prompt.contains("News and sentiment overview"));
        assert!(prompt.contains("Respond with a JSON object"));
        assert!(prompt.contains("Focus symbol: AAPL"));
        assert!(prompt.contains("AAPL: +0.2500"));
        assert!(prompt.contains("No news sentiment summary available."));
    }

    #[test]
    fn alpha_section_lists_bottom_when_universe_is_large() {
        let scores: BTreeMap<String, f64> = (0..4).map(|i| (format!("S{i}"), i as f64)).collect();
        let section = alpha_section(&scores, 2);
        assert!(section.starts_with("Top ranked signals:\n- S3"));
        assert!(section.contains("Lowest ranked signals:\n- S1: +1.0000\n- S0"));
    }

    #[test]
    fn news_prompt_lists_headlines() {
        let prompt = news_prompt(&["Fed holds rates".to_string()]);
        assert!(prompt.contains("- Fed holds rates"));
    }
}
