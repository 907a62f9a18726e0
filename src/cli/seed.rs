//! Built-in sample topics for `topics seed`.

use crate::models::{NewTopic, Priority};

struct Sample {
    name: &'static str,
    query: &'static str,
    description: &'static str,
    category: &'static str,
    priority: Priority,
    frequency: u32,
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "Climate Change News",
        query: "climate change news latest developments",
        description: "Monitor latest climate change news and developments",
        category: "Environment",
        priority: Priority::Critical,
        frequency: 6,
    },
    Sample {
        name: "AI Regulation",
        query: "artificial intelligence regulation policy",
        description: "Track AI regulation and policy developments",
        category: "Technology",
        priority: Priority::Normal,
        frequency: 24,
    },
    Sample {
        name: "Cybersecurity Threats",
        query: "cybersecurity threats vulnerabilities",
        description: "Monitor cybersecurity threats and vulnerabilities",
        category: "Security",
        priority: Priority::Critical,
        frequency: 6,
    },
    Sample {
        name: "Economic Indicators",
        query: "economic indicators inflation unemployment",
        description: "Track key economic indicators and trends",
        category: "Economy",
        priority: Priority::Normal,
        frequency: 24,
    },
    Sample {
        name: "Health Research",
        query: "medical research health studies",
        description: "Monitor latest health and medical research",
        category: "Health",
        priority: Priority::Low,
        frequency: 72,
    },
    Sample {
        name: "Renewable Energy",
        query: "renewable energy solar wind power",
        description: "Track renewable energy developments and innovations",
        category: "Energy",
        priority: Priority::Normal,
        frequency: 24,
    },
    Sample {
        name: "Space Exploration",
        query: "space exploration NASA SpaceX missions",
        description: "Monitor space exploration news and missions",
        category: "Science",
        priority: Priority::Low,
        frequency: 72,
    },
    Sample {
        name: "Digital Privacy",
        query: "digital privacy data protection regulations",
        description: "Track digital privacy and data protection developments",
        category: "Privacy",
        priority: Priority::Normal,
        frequency: 24,
    },
];

/// Sample topics whose names are not in `existing`.
pub fn sample_topics<'a>(existing: impl IntoIterator<Item = &'a str>) -> Vec<NewTopic> {
    let existing: std::collections::HashSet<&str> = existing.into_iter().collect();
    SAMPLES
        .iter()
        .filter(|s| !existing.contains(s.name))
        .map(|s| {
            NewTopic::new(s.name, s.query, s.priority, s.frequency)
                .with_description(s.description)
                .with_category(s.category)
        })
        .collect()
}
