//! Prompt templates for the upgrade generator and the two judge oracles.
//!
//! Wording lives here in one place so the engine and oracles stay free of
//! string assembly. Templates are crate-internal; the public API exposes
//! behavior, not prompt text.

/// System preamble for the upgrade generator.
pub(crate) const UPGRADE_PREAMBLE: &str = r#"# Problem Difficulty Upgrade Generator

## Task Description
You are an expert competitive programming problem creator. Your task is to take a given problem and create a **significantly more challenging, competition-level version** by strategically adding difficulty elements that test deeper understanding and more complex reasoning.

## Design Standards (Mandatory Quality Check)
To ensure the upgraded problem is competition-worthy, you must strictly adhere to these principles:
1. **Deep Synthesis**: The difficulty element must naturally intertwine with the original logic. The solution should feel like a single cohesive challenge, not a "patchwork".
2. **Multi-Step Reasoning**: The solution must require 2-3 non-trivial intermediate logical jumps. The solver must derive lemmas or intermediate states before applying standard algorithms.
3. **No Trivial Upgrades**: Avoid simply increasing N if the logic remains unchanged. The upgrade must force a change in complexity class or solution technique.
4. **Disguise & Abstraction**: Hide the core theorem or data structure behind a unique story or abstract mathematical setting. Never explicitly name the required algorithm.

## Difficulty Elements Library (Select 1-2 distinct elements)
- **Dimensionality & Constraints**: explode data scale or dimensionality to invalidate simulation or brute force; introduce dynamic updates or multiple query types.
- **Mathematical Abstraction**: reframe a procedural problem into number theory, combinatorics, or game theory; push constraints past computational limits so a closed form or invariant must be found.
- **Adversarial Structure**: add an adversary, interaction, or worst-case guarantee that forces reasoning about all strategies instead of one input.
- **Composition**: fuse the original task with a second classical problem so that neither standard solution applies directly.

## Construction Protocol (Internal Thinking Process)
1. **Analyze Original**: Identify the naive solution and its complexity.
2. **Select Category**: Choose 1-2 elements from the library above that best fit the problem's potential.
3. **Apply Core Strategy**: Redesign the problem constraints and objectives.
4. **Review**: Check against the Design Standards. Does it require multi-step reasoning? Is the technique disguised?
5. **Final Output**: Write the problem statement clearly using standard CP formatting.
"#;

/// Fixed nudge appended between rounds.
pub(crate) const NUDGE: &str = "Can you make it more difficult?";

/// Build the opening user turn for an escalation run.
pub(crate) fn upgrade_request(original_problem: &str) -> String {
    format!(
        "{preamble}\n## Input\n**Original Problem:**\n```\n{problem}\n```\n\n## Output Format\nReturn ONLY the new upgraded problem, nothing else.\n\n[Your upgraded competitive programming problem here]",
        preamble = UPGRADE_PREAMBLE,
        problem = original_problem
    )
}

/// System prompt for the solvability oracle.
pub(crate) const SOLVABILITY_SYSTEM_PROMPT: &str = r#"You are an expert in analyzing mathematical and logical problems. Your task is to determine whether a given question is solvable.

A question is considered **SOLVABLE** if:
1. It provides all necessary information and conditions
2. The problem is well-defined with clear objectives
3. It has a determinable answer (even if complex)
4. The constraints are consistent (not contradictory)

A question is considered **UNSOLVABLE** if:
1. Missing critical information or parameters
2. Contains contradictory conditions
3. The problem statement is ambiguous or unclear
4. Asks for information that cannot be determined from given data
5. The question is incomplete or truncated

**Important Guidelines:**
- Be strict but reasonable in your judgment
- Consider if a reasonable person could solve the problem with the given information
- For mathematical problems, check if all necessary values are provided
- For logical problems, verify if the premises are sufficient for the conclusion

Output format requirements:
- Return ONLY a valid JSON object
- Must have exactly these fields:
  - "solvable": boolean (true/false)
  - "confidence": number (0.0-1.0, your confidence in the judgment)
  - "reason": string (brief explanation in English, max 200 characters)
  - "missing_info": list of strings (what information is missing, empty list if solvable)

Example outputs:
{"solvable": true, "confidence": 0.95, "reason": "All necessary parameters provided, problem is well-defined", "missing_info": []}
{"solvable": false, "confidence": 0.85, "reason": "Missing the radius value needed to calculate circle area", "missing_info": ["radius"]}"#;

/// Build the user turn for a solvability check.
pub(crate) fn solvability_request(question: &str) -> String {
    format!(
        "Analyze whether the following question is solvable:\n\n{question}\n\nReturn the result as JSON with format: {{\"solvable\": true/false, \"confidence\": 0.0-1.0, \"reason\": \"explanation\", \"missing_info\": [\"item1\", \"item2\"]}}"
    )
}

/// System prompt for the difficulty comparator.
pub(crate) const DIFFICULTY_SYSTEM_PROMPT: &str = r#"You are an expert in assessing question difficulty. Evaluate questions based on:

1. Knowledge Complexity: Number and depth of concepts required
2. Cognitive Load: Reasoning levels and abstract thinking needed
3. Computational Complexity: Steps and calculations involved
4. Traps and Common Mistakes: Hidden pitfalls in the question
5. Integration Skills: Cross-domain knowledge application required

Your task is to group questions by difficulty level and sort groups from easiest to hardest.

**Important:** Questions with the SAME difficulty level should be grouped together.

Analyze each question carefully and return them grouped by difficulty level.

Output format requirements:
- Return ONLY a valid JSON object
- The JSON must have a "result" field containing a list of lists (groups)
- Each inner list contains question indices of the SAME difficulty level
- Groups should be ordered from easiest to hardest
- Use 0-based indexing matching the input order

Example output format:
{"result": [[1, 3], [0], [2, 4]]}

This means:
- Questions 1 and 3 are easiest (same difficulty)
- Question 0 is medium difficulty
- Questions 2 and 4 are hardest (same difficulty)"#;

/// Number statements for the comparator prompt, in presentation order.
pub(crate) fn format_statements(statements: &[String]) -> String {
    statements
        .iter()
        .enumerate()
        .map(|(idx, statement)| format!("[Question {}]\n{}", idx, statement))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the user turn for a difficulty ranking.
pub(crate) fn difficulty_request(formatted_statements: &str) -> String {
    format!(
        "Please group the following questions by difficulty level and sort groups from easiest to hardest:\n\n{formatted_statements}\n\nReturn the result as JSON with format: {{\"result\": [[indices of easiest group], [indices of next group], ...]}}"
    )
}
