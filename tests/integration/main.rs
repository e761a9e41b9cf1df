mod fixtures;

#[cfg(test)]
mod cli;
#[cfg(test)]
mod delete;
#[cfg(test)]
mod import;
#[cfg(test)]
mod reimport;
#[cfg(test)]
mod tree;
