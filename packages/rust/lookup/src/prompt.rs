//! Prompt text for batched school lookups.

/// Build the lookup instruction followed by one name per line.
pub fn build_prompt(cohort: &str, names: &[String]) -> String {
    let mut prompt = format!(
        "The following is a list of {cohort}; find where they attended undergrad. \
         Each line in the output should be in the format of \"{{name}} | {{school}}\". \
         Do not output any citations or annotations. Use the web browsing tool. \
         Do not ask followup questions. If the school is not found, say \"unknown\" \
         as the school.\n"
    );
    prompt.push_str(&names.join("\n"));
    prompt
}
