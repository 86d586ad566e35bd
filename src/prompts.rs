//! Prompt builder (component F): renders system prompts describing the REPL
//! vocabulary and the required response protocol.

/// Renders the system prompt for a plain completion at the given depth.
///
/// The metacognitive variant adds exactly one extra strategic hint; anything
/// longer has been observed to cause iteration blow-up in LLM callers and
/// must not be added.
pub fn system_prompt(context_size: usize, depth: u32, query: &str, metacognitive: bool) -> String {
    let mut prompt = format!(
        r#"You are a recursive language model (RLM) answering a query by writing and
running short scripts in a sandboxed REPL. Your observations (the REPL's
output) are fed back to you; you may call the REPL as many times as you
need before giving a final answer.

The full context is bound to the variable `context` ({context_size} characters).
The query you must answer is bound to the variable `query`: {query}

Environment available inside the REPL:
- `context` — the full context string
- `query` — the literal query string
- `recursive_llm(sub_query, sub_context)` — recursively answers a sub-query over
  a sub-context and returns a string; never throws
- `re.findall(pattern, text)` / `re.search(pattern, text)` — regular expressions
- `print(...)` / `console.log(...)` — write to the observation buffer
- `len(value)` — length of a string, array, or map
- `json.loads(text)` / `json.dumps(value)`
- `math.sqrt/floor/ceil/pow/abs`, `math.pi`, `math.e`
- `datetime.now()`
- `Counter(iterable)`, `defaultdict(factory)`
- `sorted(array)`, `min(array)`, `max(array)`, `sum(array)`, `enumerate(array)`, `zip(a, b)`, `any(array)`, `all(array)`

Examples:
```
print(len(context))
```
```
let matches = re.findall("\d+", context);
print(matches)
```
```
let summary = recursive_llm("summarize this section", context);
print(summary)
```

When you have the final answer, respond with `FINAL("your answer")` — this is
NOT a function call, write it as literal text in your reply. Do not wrap it in
a code fence.

Depth: {depth}"#
    );

    if metacognitive {
        prompt.push_str(
            "\n\nYou may peek at `context` first to decide how to approach the query.",
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_depth_and_context_size() {
        let prompt = system_prompt(42, 2, "how many?", false);
        assert!(prompt.contains("42 characters"));
        assert!(prompt.contains("Depth: 2"));
        assert!(prompt.contains("how many?"));
    }

    #[test]
    fn metacognitive_variant_adds_exactly_one_hint() {
        let plain = system_prompt(10, 0, "q", false);
        let meta = system_prompt(10, 0, "q", true);
        assert!(!plain.contains("peek at"));
        assert!(meta.contains("peek at"));
        // Exactly one extra hint: the meta prompt is the plain prompt plus
        // one appended paragraph, nothing else changes.
        assert_eq!(meta.matches("peek at").count(), 1);
    }

    #[test]
    fn prompt_enumerates_required_environment_names() {
        let prompt = system_prompt(1, 0, "q", false);
        for name in [
            "recursive_llm",
            "re.findall",
            "re.search",
            "print",
            "console.log",
            "len",
            "json.loads",
            "math.sqrt",
            "datetime.now",
            "Counter",
            "defaultdict",
            "sorted",
            "min",
            "max",
        ] {
            assert!(prompt.contains(name), "prompt missing `{name}`");
        }
    }
}
