/// Suggestions offered before the first message is sent.
pub const STARTER_PROMPTS: [&str; 4] = [
    "Test my knowledge of ancient civilizations",
    "Tell me the story of a superhero shark",
    "Write a story in my favorite genre",
    "Write a Python script that sends a daily email report",
];

/// Resolves `/1` through `/4` to the matching starter prompt.
pub fn starter_prompt(input: &str) -> Option<&'static str> {
    let index: usize = input.trim().strip_prefix('/')?.parse().ok()?;
    index
        .checked_sub(1)
        .and_then(|i| STARTER_PROMPTS.get(i))
        .copied()
}
