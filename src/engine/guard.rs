//! Flags narration that claims state changes no tool call actually made.
//!
//! Claims are recognised by a table of patterns, each naming the tools that
//! could have produced the change. A claim is backed when at least one of
//! those tools succeeded during the turn.

use std::collections::HashSet;

use regex::Regex;
use tracing::{error, warn};

use crate::model::tool_call::{ConsistencyFinding, ToolCallRecord, UnsupportedClaim};

macro_rules! qty {
    () => {
        r"(?:[0-9０-９]+|[一二两三四五六七八九十百千万几]+)"
    };
}

macro_rules! coin_cn {
    () => {
        r"(?:金币|金幣|银币|铜币|金子|gold)"
    };
}

macro_rules! coin_en {
    () => {
        r"(?i:gold(?:\s+(?:coins?|pieces?))?|coins?|silver)\b"
    };
}

/// Bracketed item name as narrators tend to write it.
macro_rules! item_name_cn {
    () => {
        r"(?:【[^】]+】|「[^」]+」|《[^》]+》)"
    };
}

pub struct ClaimRule {
    pub label: &'static str,
    pub patterns: &'static [&'static str],
    /// Any one of these succeeding backs the claim.
    pub tools: &'static [&'static str],
}

/// Evaluated in order; a match overlapping an earlier one is skipped, so
/// currency rules sit above the generic item rule.
pub static CLAIM_RULES: &[ClaimRule] = &[
    ClaimRule {
        label: "currency_spent",
        patterns: &[
            concat!(
                r"(?:掏出|拿出|支付|付了|付出|付给|花费|花了|交出|递出|递给)[^。！？\n]{0,8}?",
                qty!(),
                r"\s*(?:枚|个)?\s*",
                coin_cn!()
            ),
            concat!(
                r"(?i:paid|pay|spent|spend|handed over|hand over|gave|give)\s+(?:\w+\s+){0,3}?",
                qty!(),
                r"\s+",
                coin_en!()
            ),
        ],
        tools: &["modify_player_data", "enhance_equipment"],
    },
    ClaimRule {
        label: "currency_gained",
        patterns: &[
            concat!(
                r"(?:获得|得到|赚了|赚到|收到|捡到|拿到|获取|赢得)[^。！？\n]{0,6}?",
                qty!(),
                r"\s*(?:枚|个)?\s*",
                coin_cn!()
            ),
            concat!(
                r"(?i:gain(?:ed|s)?|earn(?:ed|s)?|receive(?:d|s)?|found|find|loot(?:ed)?|collect(?:ed|s)?|picked up|pick up|obtain(?:ed|s)?|won)\s+(?:\w+\s+){0,3}?",
                qty!(),
                r"\s+",
                coin_en!()
            ),
        ],
        tools: &["modify_player_data", "execute_battle_action", "update_quest"],
    },
    ClaimRule {
        label: "exp_gained",
        patterns: &[
            concat!(
                r"(?:获得|得到|增加了?|获取)[^。！？\n]{0,6}?",
                qty!(),
                r"\s*点?\s*(?:经验值?|EXP|exp|XP)"
            ),
            concat!(
                r"(?i:you\s+(?:gain|earn|receive|get)|gained|earned|received|awarded)\s+(?:\w+\s+){0,2}?",
                qty!(),
                r"\s*(?i:xp|exp|experience(?: points)?)\b"
            ),
        ],
        tools: &["modify_player_data", "execute_battle_action", "update_quest"],
    },
    ClaimRule {
        label: "restored",
        patterns: &[
            concat!(
                r"(?:恢复|回复|治愈|补充)了?[^。！？\n]{0,6}?",
                qty!(),
                r"\s*点?\s*(?:生命值?|HP|hp|法力值?|魔力|MP|mp|体力)"
            ),
            concat!(
                r"(?i:restored?|restores|recover(?:ed|s)?|heal(?:ed|s)?|regain(?:ed|s)?)\s+(?:\w+\s+){0,2}?",
                qty!(),
                r"\s*(?i:hp|mp|health|mana|hit points)\b"
            ),
        ],
        tools: &["use_item", "execute_battle_action", "modify_player_data"],
    },
    ClaimRule {
        label: "level_up",
        patterns: &[
            concat!(r"(?:升到了?|升至|提升到|提升至|达到了?)\s*(?:第\s*)?", qty!(), r"\s*级"),
            concat!(r"(?:升了|连升了?|提升了)\s*", qty!(), r"\s*级"),
            concat!(
                r"(?i:reached|reach|advanced to|now at|are now)\s+level\s+",
                qty!()
            ),
            concat!(r"(?i:level(?:ed|led) up to)\s+(?i:level\s+)?", qty!()),
        ],
        tools: &["modify_player_data", "execute_battle_action", "update_quest"],
    },
    ClaimRule {
        label: "damage",
        patterns: &[
            concat!(r"(?:造成了?|受到了?)\s*", qty!(), r"\s*点?\s*的?伤害"),
            concat!(
                r"(?i:you\s+(?:deal|take|suffer|inflict)|dealt|deals|took|takes|suffer(?:s|ed)|inflict(?:s|ed))\s+",
                qty!(),
                r"\s+(?:points?\s+of\s+)?(?i:damage)\b"
            ),
        ],
        tools: &["execute_battle_action"],
    },
    ClaimRule {
        label: "item_obtained",
        patterns: &[
            concat!(
                r"(?:获得|得到|捡到|拿到|收下|获取|入手)了?\s*(?:",
                qty!(),
                r"\s*(?:个|件|瓶|把|枚|份|块|张|颗)\s*)?",
                item_name_cn!()
            ),
            concat!(
                r"(?:获得|得到|捡到|拿到|收下|获取)了?\s*",
                qty!(),
                r"\s*(?:个|件|瓶|把|份|块|张|颗)\p{Han}{1,8}"
            ),
            concat!(
                r"(?i:obtain(?:ed|s)?|receive(?:d|s)?|picked up|pick up|found|loot(?:ed)?|acquire(?:d|s)?)\s+(?:(?i:an?|the)\s+|",
                qty!(),
                r"\s+)?(?:\[[^\]]+\]|[A-Z][\w']*(?:\s+[A-Z][\w']*)*)"
            ),
        ],
        tools: &["add_item", "execute_battle_action", "update_quest"],
    },
    ClaimRule {
        label: "equipped",
        patterns: &[
            concat!(r"(?:装备上了?|穿上了?|戴上了?|换上了?)\s*(?:", item_name_cn!(), r"|\p{Han}{1,8})"),
            r"(?i:you equip|equipped|put on|donned|wielding)\s+(?:(?i:the|your|an?)\s+)?(?:\[[^\]]+\]|[A-Z][\w']*)",
        ],
        tools: &["modify_player_data", "enhance_equipment"],
    },
    ClaimRule {
        label: "consumed",
        patterns: &[
            concat!(
                r"(?:喝下|喝了|服下|服用|吃下|使用了|用掉)[^。！？\n]{0,8}?(?:",
                item_name_cn!(),
                r"|药水|药剂|药草|丹药)"
            ),
            r"(?i:drank|drink|quaffed|quaff|consumed?|used up|swallowed)\s+(?:(?i:an?|the|your)\s+)?(?:\w+\s+){0,2}?(?:\[[^\]]+\]|(?i:potion|elixir|tonic|herb|draught))",
        ],
        tools: &["use_item", "execute_battle_action"],
    },
];

struct CompiledRule {
    label: &'static str,
    patterns: Vec<Regex>,
    tools: &'static [&'static str],
}

pub struct ConsistencyGuard {
    rules: Vec<CompiledRule>,
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyGuard {
    pub fn new() -> Self {
        Self::with_rules(CLAIM_RULES)
    }

    pub fn with_rules(table: &'static [ClaimRule]) -> Self {
        let rules = table
            .iter()
            .map(|rule| CompiledRule {
                label: rule.label,
                patterns: rule
                    .patterns
                    .iter()
                    .filter_map(|p| match Regex::new(p) {
                        Ok(re) => Some(re),
                        Err(err) => {
                            error!(label = rule.label, error = %err, "claim pattern failed to compile, skipping");
                            None
                        }
                    })
                    .collect(),
                tools: rule.tools,
            })
            .collect();
        Self { rules }
    }

    /// Compares `narrative` against the turn's tool records. Advisory only.
    pub fn check(&self, narrative: &str, records: &[ToolCallRecord]) -> ConsistencyFinding {
        let succeeded: HashSet<&str> = records
            .iter()
            .filter(|r| r.success)
            .map(|r| r.name.as_str())
            .collect();

        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut claims = Vec::new();

        for rule in &self.rules {
            for re in &rule.patterns {
                for m in re.find_iter(narrative) {
                    if taken.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                        continue;
                    }
                    taken.push((m.start(), m.end()));
                    if rule.tools.iter().any(|t| succeeded.contains(t)) {
                        continue;
                    }
                    claims.push(UnsupportedClaim {
                        claim: m.as_str().trim().to_string(),
                        label: rule.label.to_string(),
                        required_tools: rule.tools.iter().map(|t| t.to_string()).collect(),
                    });
                }
            }
        }

        if claims.is_empty() {
            return ConsistencyFinding::default();
        }

        let reason = claims
            .iter()
            .map(|c| {
                format!(
                    "claim \"{}\" ({}) is not backed by a successful {} call",
                    c.claim,
                    c.label,
                    c.required_tools.join(" or ")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        warn!(claims = claims.len(), %reason, "narration claims unbacked state changes");

        ConsistencyFinding {
            has_hallucination: true,
            reason: Some(reason),
            claims,
        }
    }
}
