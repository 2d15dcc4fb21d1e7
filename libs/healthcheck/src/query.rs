use std::collections::BTreeMap;
use std::fmt;

use tabled::Tabled;
use tracing::warn;

use crate::HealthCheck;

/// Which subsystem(s) own a controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubsystemLookup {
    Missing,
    Unique(String),
    /// More than one owner, in the order first encountered. Always a data error.
    Multiple(Vec<String>),
}

impl fmt::Display for SubsystemLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsystemLookup::Missing => Ok(()),
            SubsystemLookup::Unique(name) => f.write_str(name),
            SubsystemLookup::Multiple(names) => f.write_str(&names.join(",")),
        }
    }
}

/// One row of the distinct-case view.
#[derive(Clone, Debug, PartialEq, Tabled)]
pub struct CaseSummary {
    pub case: i64,
    pub name: String,
    #[tabled(rename = "controller_set")]
    pub controller: i64,
    #[tabled(rename = "type")]
    pub test_type: String,
    pub output: f64,
    pub duration: i64,
}

impl HealthCheck {
    /// Resolves the subsystem(s) a measured controller belongs to. Memoized.
    pub fn subsystem_lookup(&self, controller: i64) -> SubsystemLookup {
        if let Some(lookup) = self.shared.subsystem_cache.borrow().get(&controller) {
            return lookup.clone();
        }

        let lookup = {
            let table = self.table();
            let mut names: Vec<&str> = Vec::new();
            for rows in table.index().controller_rows(controller) {
                for row in rows {
                    let name = table.name_at(row);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            match names.as_slice() {
                [] => {
                    warn!("no subsystem found for controller {controller}");
                    SubsystemLookup::Missing
                }
                [name] => SubsystemLookup::Unique(name.to_string()),
                _ => {
                    warn!("multiple subsystem found for controller {controller}");
                    SubsystemLookup::Multiple(names.iter().map(|n| n.to_string()).collect())
                }
            }
        };

        self.shared
            .subsystem_cache
            .borrow_mut()
            .insert(controller, lookup.clone());
        lookup
    }

    /// Subsystem name for a controller; empty when unknown, comma-joined when
    /// the controller shows up under several subsystems.
    pub fn subsystem_for_controller(&self, controller: i64) -> String {
        self.subsystem_lookup(controller).to_string()
    }

    /// One summary per case id, ascending. The first row of each case in index
    /// order supplies its values.
    pub fn cases(&self) -> Vec<CaseSummary> {
        let table = self.table();
        let case_ids = table.case_ids();
        let controllers = table.controllers_set();
        let outputs = table.outputs();
        let durations = table.durations();

        let mut cases: BTreeMap<i64, CaseSummary> = BTreeMap::new();
        for row in 0..table.num_rows() {
            let case = case_ids.value(row);
            cases.entry(case).or_insert_with(|| CaseSummary {
                case,
                name: table.name_at(row).to_string(),
                controller: controllers.value(row),
                test_type: table.test_type_at(row).to_string(),
                output: outputs.value(row),
                duration: durations.value(row),
            });
        }
        cases.into_values().collect()
    }

    /// Distinct subsystem names in order of first appearance.
    pub fn subsystems(&self) -> Vec<String> {
        let table = self.table();
        let mut names: Vec<String> = Vec::new();
        for row in 0..table.num_rows() {
            let name = table.name_at(row);
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Distinct measured controllers, ascending.
    pub fn controllers(&self) -> Vec<i64> {
        let table = self.table();
        let mut controllers: Vec<i64> = table.index().keys().map(|(c, _)| c).collect();
        controllers.dedup();
        controllers
    }

    /// Measured controllers sampled during `case`, ascending.
    pub fn controllers_for_case(&self, case: i64) -> Vec<i64> {
        let table = self.table();
        table
            .index()
            .keys()
            .filter(|&(_, c)| c == case)
            .map(|(controller, _)| controller)
            .collect()
    }
}
